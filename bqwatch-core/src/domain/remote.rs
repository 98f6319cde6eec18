//! Remote job status
//!
//! What the job-execution API reports about a job at poll time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::job::{ErrorInfo, JobStatus};

/// Job state as reported by BigQuery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteJobState {
    Pending,
    Running,
    Done,
}

impl From<RemoteJobState> for JobStatus {
    fn from(state: RemoteJobState) -> Self {
        match state {
            RemoteJobState::Pending => JobStatus::Pending,
            RemoteJobState::Running => JobStatus::Running,
            RemoteJobState::Done => JobStatus::Done,
        }
    }
}

/// Snapshot of a remote job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJobStatus {
    pub state: RemoteJobState,

    /// Present when a DONE job finished with an error
    pub error_result: Option<Value>,
}

impl RemoteJobStatus {
    pub fn pending() -> Self {
        Self {
            state: RemoteJobState::Pending,
            error_result: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: RemoteJobState::Running,
            error_result: None,
        }
    }

    pub fn done() -> Self {
        Self {
            state: RemoteJobState::Done,
            error_result: None,
        }
    }

    pub fn done_with_error(error_result: Value) -> Self {
        Self {
            state: RemoteJobState::Done,
            error_result: Some(error_result),
        }
    }

    /// Error payload in the form stored on the job record
    pub fn error_info(&self) -> Option<ErrorInfo> {
        self.error_result.clone().map(ErrorInfo::new)
    }
}
