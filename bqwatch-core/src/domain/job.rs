//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Tracked remote job
///
/// Structure persisted by the job store and reconciled by the poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Id assigned by BigQuery at submission time
    pub job_id: String,

    /// Region qualifier needed to address the job
    pub location: Option<String>,

    /// Session or connection that submitted the job
    pub owner_id: String,

    pub status: JobStatus,

    /// Set only once the job reached a terminal state that reflects a failure
    pub error_info: Option<ErrorInfo>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a record for a freshly submitted job
    pub fn new(
        job_id: impl Into<String>,
        location: Option<String>,
        owner_id: impl Into<String>,
        status: JobStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            location,
            owner_id: owner_id.into(),
            status,
            error_info: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when the job finished and the outcome is a failure
    ///
    /// BigQuery reports failed jobs as `DONE` with an error payload, so both
    /// `ERROR` and `DONE` + `error_info` count as failed.
    pub fn failed(&self) -> bool {
        match self.status {
            JobStatus::Error => true,
            JobStatus::Done => self.error_info.is_some(),
            JobStatus::Pending | JobStatus::Running => false,
        }
    }
}

/// Job status as tracked by the store
///
/// Serialized in UPPERCASE; parsing, including JSON input, ignores case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// Statuses the poller still has to reconcile
    pub const NON_TERMINAL: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Running];

    /// DONE and ERROR never transition again
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "DONE" => Ok(JobStatus::Done),
            "ERROR" => Ok(JobStatus::Error),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = UnknownStatus;

    fn try_from(s: String) -> Result<Self, UnknownStatus> {
        s.parse()
    }
}

/// Returned when a status string does not name a known status
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct UnknownStatus(pub String);

/// Structured error payload attached to a failed job
///
/// Remote payloads are kept verbatim; `polling_error` builds the marker the
/// poller writes when it can no longer find the job remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorInfo(Value);

impl ErrorInfo {
    pub const POLLING_ERROR: &'static str = "PollingError";

    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// `{"kind": "PollingError", "detail": <detail>}`
    pub fn polling_error(detail: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("kind".into(), Value::String(Self::POLLING_ERROR.into()));
        map.insert("detail".into(), Value::String(detail.into()));
        Self(Value::Object(map))
    }

    /// Value of the `kind` field, if the payload has one
    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ErrorInfo {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
