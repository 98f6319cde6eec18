//! Server configuration
//!
//! Defines all configurable parameters for the server including the job
//! store connection, BigQuery access, poll cadence and retry budget.

use std::time::Duration;

use bqwatch_client::RetryPolicy;
use tokio::sync::Semaphore;

/// Server configuration
///
/// Intervals and budgets are configurable to allow tuning for different
/// deployment scenarios (dev vs prod, small vs large job volumes).
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string for the job store
    pub database_url: String,

    /// Address the HTTP API binds to (e.g., "127.0.0.1:8080")
    pub bind_addr: String,

    /// Project the tracked BigQuery jobs belong to
    pub project_id: String,

    /// BigQuery REST base URL
    pub bigquery_url: String,

    /// OAuth2 bearer token for BigQuery requests
    pub access_token: Option<String>,

    /// When set, `/api/*` requires `Authorization: Bearer <api_key>`
    pub api_key: Option<String>,

    pub poller: PollerConfig,

    pub retry: RetryPolicy,
}

/// Poller cadence and batch sizing
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between two poll cycles
    pub poll_interval: Duration,

    /// Maximum records fetched from the store per cycle
    pub pending_job_query_limit: usize,

    /// Only poll jobs whose record has not been updated for this long (zero = all)
    pub pending_min_age: Duration,

    /// Maximum remote status calls in flight at once
    pub max_concurrent_polls: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            pending_job_query_limit: 50,
            pending_min_age: Duration::ZERO,
            max_concurrent_polls: 8,
        }
    }
}

impl PollerConfig {
    /// Validates the poller settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.pending_job_query_limit == 0 {
            anyhow::bail!("pending_job_query_limit must be greater than 0");
        }

        if self.max_concurrent_polls == 0 {
            anyhow::bail!("max_concurrent_polls must be greater than 0");
        }

        if self.max_concurrent_polls > Semaphore::MAX_PERMITS {
            anyhow::bail!(
                "max_concurrent_polls cannot exceed {}",
                Semaphore::MAX_PERMITS
            );
        }

        Ok(())
    }
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(database_url: String, project_id: String) -> Self {
        Self {
            database_url,
            bind_addr: "127.0.0.1:8080".to_string(),
            project_id,
            bigquery_url: bqwatch_client::DEFAULT_BASE_URL.to_string(),
            access_token: None,
            api_key: None,
            poller: PollerConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("database_url cannot be empty");
        }

        if self.project_id.is_empty() {
            anyhow::bail!("project_id cannot be empty");
        }

        if !self.bigquery_url.starts_with("http://") && !self.bigquery_url.starts_with("https://")
        {
            anyhow::bail!("bigquery_url must start with http:// or https://");
        }

        if self.api_key.as_deref() == Some("") {
            anyhow::bail!("api_key cannot be empty when set");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry attempts must be greater than 0");
        }

        if self.retry.attempt_timeout.is_zero() {
            anyhow::bail!("request timeout must be greater than 0");
        }

        self.poller.validate()
    }
}
