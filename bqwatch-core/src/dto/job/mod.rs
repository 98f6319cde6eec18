//! Job DTOs for the host API

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobRecord, JobStatus};

/// Request to start tracking a submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJob {
    pub job_id: String,
    pub location: Option<String>,
    pub owner_id: String,
    /// State observed at submission time, defaults to PENDING
    pub status: Option<JobStatus>,
}

impl From<RegisterJob> for JobRecord {
    fn from(req: RegisterJob) -> Self {
        JobRecord::new(
            req.job_id,
            req.location,
            req.owner_id,
            req.status.unwrap_or(JobStatus::Pending),
        )
    }
}

/// Filter for listing tracked jobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub owner_id: Option<String>,
    pub limit: Option<usize>,
}
