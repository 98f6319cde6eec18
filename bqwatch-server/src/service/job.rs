//! Job Service
//!
//! Registration and lookup of tracked jobs. Status transitions after
//! registration belong to the poller.

use bqwatch_core::domain::job::{JobRecord, JobStatus};
use bqwatch_core::dto::job::{JobFilter, RegisterJob};

use crate::repository::{JobStore, StoreError};

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(String),
    AlreadyTracked(String),
    ValidationError(String),
    StoreError(StoreError),
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => JobError::NotFound(id),
            StoreError::AlreadyExists(id) => JobError::AlreadyTracked(id),
            other => JobError::StoreError(other),
        }
    }
}

/// Start tracking a job that was just submitted to BigQuery
pub async fn register_job(store: &dyn JobStore, req: RegisterJob) -> Result<JobRecord, JobError> {
    validate_registration(&req)?;

    let job = store.insert(req.into()).await?;

    tracing::info!(
        "Tracking job {} for {} (status: {})",
        job.job_id,
        job.owner_id,
        job.status
    );

    Ok(job)
}

/// Get a tracked job by id
pub async fn get_job(store: &dyn JobStore, job_id: &str) -> Result<JobRecord, JobError> {
    let job = store
        .get(job_id)
        .await?
        .ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

    Ok(job)
}

/// List tracked jobs, newest first
pub async fn list_jobs(store: &dyn JobStore, filter: &JobFilter) -> Result<Vec<JobRecord>, JobError> {
    let jobs = store.list(filter).await?;
    Ok(jobs)
}

// =============================================================================
// Validation
// =============================================================================

fn validate_registration(req: &RegisterJob) -> Result<(), JobError> {
    if req.job_id.trim().is_empty() {
        return Err(JobError::ValidationError(
            "job_id cannot be empty".to_string(),
        ));
    }

    if req.owner_id.trim().is_empty() {
        return Err(JobError::ValidationError(
            "owner_id cannot be empty".to_string(),
        ));
    }

    // ERROR is only ever assigned by the poller
    if req.status == Some(JobStatus::Error) {
        return Err(JobError::ValidationError(
            "Cannot register a job in ERROR state".to_string(),
        ));
    }

    Ok(())
}
