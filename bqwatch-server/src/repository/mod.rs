//! Repository layer
//!
//! Durable storage for tracked job records. The poller and the API only see
//! the `JobStore` trait so they can be exercised against an in-memory store
//! in tests.

mod job;
#[cfg(test)]
pub mod memory;

pub use job::PgJobStore;

use async_trait::async_trait;
use bqwatch_core::domain::job::{ErrorInfo, JobRecord, JobStatus};
use bqwatch_core::dto::job::JobFilter;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Page size for `list` when the filter does not set one
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Hard cap on `list` page size
pub const MAX_LIST_LIMIT: usize = 1000;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error("job {0} is already tracked")]
    AlreadyExists(String),

    /// The record already reached a different terminal status
    #[error("job {job_id} is already {status} and cannot become {requested}")]
    TerminalState {
        job_id: String,
        status: JobStatus,
        requested: JobStatus,
    },

    #[error("job store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Durable keyed storage for job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Write-once insert of a newly submitted job
    async fn insert(&self, record: JobRecord) -> Result<JobRecord, StoreError>;

    /// Find a job by id
    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError>;

    /// List jobs, newest first
    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError>;

    /// Non-terminal jobs, least recently updated first
    ///
    /// # Arguments
    /// * `older_than` - Only return jobs not updated for at least this long; zero disables the filter
    /// * `limit` - Maximum number of records returned
    async fn query_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError>;

    /// Overwrite status and error payload, refreshing `updated_at`
    ///
    /// Re-applying the current terminal status is accepted; moving a terminal
    /// record to any other status fails with `TerminalState`.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_info: Option<ErrorInfo>,
    ) -> Result<(), StoreError>;
}

/// `updated_at` threshold for `query_pending`, `None` when no age filter applies
pub(crate) fn pending_cutoff(older_than: Duration) -> Option<DateTime<Utc>> {
    if older_than.is_zero() {
        return None;
    }

    let age = chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::MAX);
    Some(
        Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    )
}

pub(crate) fn list_limit(filter: &JobFilter) -> usize {
    filter
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT)
}
