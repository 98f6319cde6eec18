//! Job poller
//!
//! Reconciles tracked jobs against BigQuery. Each cycle fetches a batch of
//! non-terminal records, asks the remote API for every job's current state
//! and writes back the transitions. Records are checked concurrently, bounded
//! by a semaphore, and the whole batch finishes before the next cycle starts,
//! so the same job is never polled twice at once.

use bqwatch_client::{ErrorKind, RemoteJobClient};
use bqwatch_core::domain::job::{ErrorInfo, JobRecord, JobStatus};
use bqwatch_core::domain::remote::{RemoteJobState, RemoteJobStatus};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::repository::{JobStore, StoreError};

/// Detail recorded when the remote API no longer knows a job
const NOT_FOUND_DETAIL: &str = "not found";

/// Job poller that keeps stored job records in line with BigQuery
pub struct JobPoller {
    config: PollerConfig,
    store: Arc<dyn JobStore>,
    client: Arc<dyn RemoteJobClient>,
    semaphore: Arc<Semaphore>,
}

/// Write the poller decided on for one record
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: JobStatus,
    pub error_info: Option<ErrorInfo>,
}

/// What happened to a single record during a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Updated,
    Unchanged,
    /// Left as is, eligible again next cycle
    Skipped,
    Cancelled,
}

/// Per-cycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub cancelled: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Updated => self.updated += 1,
            RecordOutcome::Unchanged => self.unchanged += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Cancelled => self.cancelled += 1,
        }
    }
}

impl JobPoller {
    /// Creates a new job poller
    pub fn new(
        config: PollerConfig,
        store: Arc<dyn JobStore>,
        client: Arc<dyn RemoteJobClient>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(
            config
                .max_concurrent_polls
                .clamp(1, Semaphore::MAX_PERMITS),
        ));
        Self {
            config,
            store,
            client,
            semaphore,
        }
    }

    /// Runs poll cycles until `shutdown` is cancelled
    ///
    /// Never returns on errors: a failed cycle is logged and retried after
    /// the regular interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Starting job poller (interval: {:?}, batch limit: {}, max concurrent polls: {})",
            self.config.poll_interval,
            self.config.pending_job_query_limit,
            self.config.max_concurrent_polls
        );

        while !shutdown.is_cancelled() {
            debug!("Polling for pending jobs");

            match self.poll_once(&shutdown).await {
                Ok(report) => {
                    if report.updated > 0 || report.skipped > 0 {
                        info!(
                            "Poll cycle complete: {} checked, {} updated, {} unchanged, {} skipped",
                            report.fetched, report.updated, report.unchanged, report.skipped
                        );
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {}", e);
                }
            }

            debug!(
                "Poll cycle finished, waiting {:?}",
                self.config.poll_interval
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("Job poller stopped");
    }

    /// Performs a single poll cycle
    ///
    /// Fails only when the batch itself cannot be fetched. Per-record
    /// failures are logged and counted as skipped.
    pub async fn poll_once(&self, shutdown: &CancellationToken) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport::default();

        let records = tokio::select! {
            _ = shutdown.cancelled() => return Ok(report),
            records = self.store.query_pending(
                self.config.pending_min_age,
                self.config.pending_job_query_limit,
            ) => records?,
        };

        if records.is_empty() {
            debug!("No pending jobs to check");
            return Ok(report);
        }

        info!("Found {} pending job(s) to check", records.len());
        report.fetched = records.len();

        let mut handles = Vec::with_capacity(records.len());

        for record in records {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!("Poll semaphore closed: {}", e);
                        break;
                    }
                },
            };

            let job_id = record.job_id.clone();
            handles.push((job_id, self.spawn_record_task(record, permit, shutdown.clone())));
        }

        // Records never dispatched because of shutdown
        report.cancelled += report.fetched - handles.len();

        for (job_id, handle) in handles {
            match handle.await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Poll task for job {} failed: {}", job_id, e);
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Spawns a task to reconcile a single record
    fn spawn_record_task(
        &self,
        record: JobRecord,
        permit: OwnedSemaphorePermit,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<RecordOutcome> {
        let store = Arc::clone(&self.store);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            let outcome = reconcile_record(store.as_ref(), client.as_ref(), &record, &shutdown).await;
            drop(permit);
            outcome
        })
    }
}

/// Checks one record against the remote API and writes back any transition
async fn reconcile_record(
    store: &dyn JobStore,
    client: &dyn RemoteJobClient,
    record: &JobRecord,
    shutdown: &CancellationToken,
) -> RecordOutcome {
    let job_id = record.job_id.as_str();

    if record.is_terminal() {
        debug!("Job {} is already {}, not polling", job_id, record.status);
        return RecordOutcome::Unchanged;
    }

    debug!("Checking status of job {} (stored status: {})", job_id, record.status);

    let remote = tokio::select! {
        _ = shutdown.cancelled() => return RecordOutcome::Cancelled,
        result = client.get_status(job_id, record.location.as_deref()) => result,
    };

    // A shutdown that raced the remote call wins; the write is not applied
    if shutdown.is_cancelled() {
        return RecordOutcome::Cancelled;
    }

    let change = match remote {
        Ok(status) => {
            debug!("Remote status for job {}: {:?}", job_id, status.state);
            plan_transition(record, &status)
        }
        Err(err) => match err.kind() {
            ErrorKind::NotFound => {
                warn!(
                    "Job {} not found remotely while {}, marking as ERROR",
                    job_id, record.status
                );
                Some(StatusChange {
                    status: JobStatus::Error,
                    error_info: Some(ErrorInfo::polling_error(NOT_FOUND_DETAIL)),
                })
            }
            ErrorKind::Transient => {
                warn!(
                    "Remote status for job {} unavailable, staying {} until next cycle: {}",
                    job_id, record.status, err
                );
                return RecordOutcome::Skipped;
            }
            ErrorKind::Permanent => {
                error!(
                    "Remote status request for job {} rejected, leaving it unchanged: {}",
                    job_id, err
                );
                return RecordOutcome::Skipped;
            }
        },
    };

    let Some(change) = change else {
        debug!("Job {} still {}, no update", job_id, record.status);
        return RecordOutcome::Unchanged;
    };

    match change.status {
        JobStatus::Done if change.error_info.is_some() => {
            warn!("Job {} completed with errors", job_id)
        }
        JobStatus::Done => info!("Job {} completed successfully", job_id),
        status => info!("Job {} changed from {} to {}", job_id, record.status, status),
    }

    match store
        .update_status(job_id, change.status, change.error_info)
        .await
    {
        Ok(()) => RecordOutcome::Updated,
        Err(e @ StoreError::TerminalState { .. }) => {
            warn!("Skipping write for job {}: {}", job_id, e);
            RecordOutcome::Skipped
        }
        Err(e) => {
            error!("Failed to write status of job {}: {}", job_id, e);
            RecordOutcome::Skipped
        }
    }
}

/// Decides which write, if any, reconciles `record` with `remote`
///
/// DONE is written with the remote error payload, if any. An unchanged
/// non-terminal state needs no write; terminal records are never touched.
pub fn plan_transition(record: &JobRecord, remote: &RemoteJobStatus) -> Option<StatusChange> {
    if record.is_terminal() {
        return None;
    }

    match remote.state {
        RemoteJobState::Done => Some(StatusChange {
            status: JobStatus::Done,
            error_info: remote.error_info(),
        }),
        state => {
            let status = JobStatus::from(state);
            (status != record.status).then_some(StatusChange {
                status,
                error_info: None,
            })
        }
    }
}
