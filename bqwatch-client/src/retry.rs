//! Retry with exponential backoff for transient remote errors.
//!
//! Only `ErrorKind::Transient` failures are retried. `NotFound` and
//! `Permanent` errors are returned on the first occurrence. Every attempt is
//! bounded by `attempt_timeout`, so a full call never takes longer than
//! `max_attempts * (attempt_timeout + max_delay)`.

use std::time::Duration;

use async_trait::async_trait;
use bqwatch_core::domain::remote::RemoteJobStatus;
use rand::Rng;
use tracing::warn;

use crate::RemoteJobClient;
use crate::error::{ClientError, ErrorKind, Result};

/// Attempt budget and backoff shape
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
    /// Deadline for a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff with 25% jitter, never above `max_delay`.
    ///
    /// `attempt` is zero-based: the delay after the first failure is
    /// `base_delay` +/- 25%.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
        let capped_ms = exp_ms.min(self.max_delay.as_millis() as u64);

        let jitter_range = capped_ms / 4;
        let jitter = if jitter_range > 0 {
            let offset = rand::thread_rng().gen_range(0..=jitter_range.saturating_mul(2));
            offset as i64 - jitter_range as i64
        } else {
            0
        };

        let delay_ms = (capped_ms as i64 + jitter).max(0) as u64;
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    /// Upper bound on the time spent sleeping between attempts
    pub fn backoff_budget(&self) -> Duration {
        self.max_delay
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Wraps a `RemoteJobClient` and retries transient failures
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: RemoteJobClient> RemoteJobClient for RetryingClient<C> {
    async fn get_status(&self, job_id: &str, location: Option<&str>) -> Result<RemoteJobStatus> {
        let budget = self.policy.backoff_budget();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        let mut slept = Duration::ZERO;

        loop {
            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.inner.get_status(job_id, location),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout(self.policy.attempt_timeout)),
            };

            let err = match result {
                Ok(status) => return Ok(status),
                Err(err) if err.kind() != ErrorKind::Transient => return Err(err),
                Err(err) => err,
            };

            attempt += 1;
            if attempt >= max_attempts {
                warn!(job_id, attempts = attempt, error = %err, "Retry attempts exhausted");
                return Err(err);
            }

            let delay = self.policy.backoff_delay(attempt - 1);
            if slept + delay > budget {
                warn!(
                    job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retry budget exhausted, returning last error"
                );
                return Err(err);
            }

            warn!(
                job_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying after transient error"
            );
            tokio::time::sleep(delay).await;
            slept += delay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns scripted results in order, repeating the last one
    struct ScriptedClient {
        script: Mutex<Vec<Result<RemoteJobStatus>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(script: Vec<Result<RemoteJobStatus>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteJobClient for ScriptedClient {
        async fn get_status(&self, job_id: &str, _: Option<&str>) -> Result<RemoteJobStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                return script.remove(0);
            }
            match &script[0] {
                Ok(status) => Ok(status.clone()),
                Err(err) => Err(copy_error(err, job_id)),
            }
        }
    }

    fn copy_error(err: &ClientError, job_id: &str) -> ClientError {
        match err {
            ClientError::ApiError { status, message } => ClientError::api_error(*status, message.clone()),
            ClientError::NotFound(_) => ClientError::NotFound(job_id.to_string()),
            other => ClientError::ParseError(other.to_string()),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_returns_first_success() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Ok(RemoteJobStatus::running())]),
            fast_policy(),
        );
        let status = client.get_status("j1", None).await.unwrap();
        assert_eq!(status, RemoteJobStatus::running());
        assert_eq!(client.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_errors() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![
                Err(ClientError::api_error(503, "unavailable")),
                Err(ClientError::api_error(429, "slow down")),
                Ok(RemoteJobStatus::done()),
            ]),
            fast_policy(),
        );
        let status = client.get_status("j1", None).await.unwrap();
        assert_eq!(status, RemoteJobStatus::done());
        assert_eq!(client.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(ClientError::api_error(503, "unavailable"))]),
            fast_policy(),
        );
        let err = client.get_status("j4", None).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.inner().calls(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(ClientError::api_error(403, "forbidden"))]),
            fast_policy(),
        );
        let err = client.get_status("j1", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert_eq!(client.inner().calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let client = RetryingClient::new(
            ScriptedClient::new(vec![Err(ClientError::NotFound("j1".into()))]),
            fast_policy(),
        );
        let err = client.get_status("j1", None).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.inner().calls(), 1);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_millis(2000),
            attempt_timeout: Duration::from_secs(1),
        };

        let first = policy.backoff_delay(0);
        assert!(first >= Duration::from_millis(300) && first <= Duration::from_millis(500));

        let second = policy.backoff_delay(1);
        assert!(second >= Duration::from_millis(600) && second <= Duration::from_millis(1000));

        for attempt in 3..10 {
            assert!(policy.backoff_delay(attempt) <= Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_backoff_budget() {
        assert_eq!(RetryPolicy::default().backoff_budget(), Duration::from_secs(16));
    }
}
