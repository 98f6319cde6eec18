//! bqwatch BigQuery Client
//!
//! A small, type-safe client for the BigQuery jobs API, plus the
//! `RemoteJobClient` capability the poller consumes.
//!
//! Errors carry an [`ErrorKind`] so callers can tell a vanished job from a
//! transient outage or a permanent failure with a `match`. Transient failures
//! are retried by wrapping any client in [`RetryingClient`].
//!
//! # Example
//!
//! ```no_run
//! use bqwatch_client::{BigQueryClient, RemoteJobClient, RetryPolicy, RetryingClient};
//!
//! # async fn example() -> bqwatch_client::Result<()> {
//! let client = BigQueryClient::new("my-project").with_access_token("ya29.token");
//! let client = RetryingClient::new(client, RetryPolicy::default());
//!
//! let status = client.get_status("job_abc123", Some("US")).await?;
//! println!("state: {:?}", status.state);
//! # Ok(())
//! # }
//! ```

pub mod error;
mod jobs;
pub mod retry;

// Re-export commonly used types
pub use error::{ClientError, ErrorKind, Result};
pub use retry::{RetryPolicy, RetryingClient};

use async_trait::async_trait;
use bqwatch_core::domain::remote::RemoteJobStatus;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Default BigQuery REST endpoint
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Capability for fetching the live status of a remote job
#[async_trait]
pub trait RemoteJobClient: Send + Sync {
    /// Fetches the current status of a job
    ///
    /// # Arguments
    /// * `job_id` - The id BigQuery assigned at submission
    /// * `location` - Region qualifier, if the job was not created in the default location
    async fn get_status(&self, job_id: &str, location: Option<&str>) -> Result<RemoteJobStatus>;
}

#[async_trait]
impl<T: RemoteJobClient + ?Sized> RemoteJobClient for Arc<T> {
    async fn get_status(&self, job_id: &str, location: Option<&str>) -> Result<RemoteJobStatus> {
        (**self).get_status(job_id, location).await
    }
}

/// HTTP client for the BigQuery jobs API
///
/// Constructed once by the host process and shared by reference; there is no
/// process-wide client cache.
#[derive(Debug, Clone)]
pub struct BigQueryClient {
    /// Base URL of the REST API (e.g., "https://bigquery.googleapis.com/bigquery/v2")
    base_url: String,
    /// Project the jobs belong to
    project_id: String,
    /// OAuth2 bearer token, if requests should be authenticated
    access_token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl BigQueryClient {
    /// Create a client against the public BigQuery endpoint
    ///
    /// # Example
    /// ```
    /// use bqwatch_client::BigQueryClient;
    ///
    /// let client = BigQueryClient::new("my-project");
    /// assert_eq!(client.project_id(), "my-project");
    /// ```
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::with_client(DEFAULT_BASE_URL, project_id, Client::new())
    }

    /// Create a client with a custom base URL and HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, or to
    /// point the client at an emulator.
    ///
    /// # Example
    /// ```
    /// use bqwatch_client::BigQueryClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = BigQueryClient::with_client("http://localhost:9050/bigquery/v2", "test", http_client);
    /// assert_eq!(client.base_url(), "http://localhost:9050/bigquery/v2");
    /// ```
    pub fn with_client(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            access_token: None,
            client,
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Non-success status codes become `ApiError`, which classifies itself
    /// by status code.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BigQueryClient::new("proj");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
        assert_eq!(client.project_id(), "proj");
        assert!(client.access_token.is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = BigQueryClient::with_client("http://localhost:9050/", "proj", Client::new());
        assert_eq!(client.base_url(), "http://localhost:9050");
    }

    #[test]
    fn test_with_access_token() {
        let client = BigQueryClient::new("proj").with_access_token("secret");
        assert_eq!(client.access_token.as_deref(), Some("secret"));
    }
}
