//! Error types for the BigQuery client

use std::time::Duration;

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// How a failed remote call should be treated by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The job no longer exists remotely
    NotFound,
    /// Expected to clear up on its own; safe to retry
    Transient,
    /// Retrying will not help (bad request, permission denied, bad payload)
    Permanent,
}

/// Errors that can occur when talking to the BigQuery API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body returned by the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Job not found
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A single attempt exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Classifies the error for retry and reconciliation decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ApiError { status: 404, .. } => ErrorKind::NotFound,
            Self::ApiError { status, .. } => status_kind(*status),
            Self::RequestFailed(err) => match err.status() {
                Some(status) => status_kind(status.as_u16()),
                None if err.is_builder() || err.is_decode() || err.is_redirect() => {
                    ErrorKind::Permanent
                }
                None => ErrorKind::Transient,
            },
            Self::Timeout(_) => ErrorKind::Transient,
            Self::ParseError(_) | Self::InvalidRequest(_) => ErrorKind::Permanent,
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if retrying could succeed
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

fn status_kind(status: u16) -> ErrorKind {
    match status {
        404 => ErrorKind::NotFound,
        408 | 429 | 500 | 502 | 503 | 504 => ErrorKind::Transient,
        _ => ErrorKind::Permanent,
    }
}
