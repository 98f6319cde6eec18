//! In-memory job store used by tests
//!
//! Mirrors the semantics of `PgJobStore` and counts writes so tests can
//! assert on suppressed updates.

use async_trait::async_trait;
use bqwatch_core::domain::job::{ErrorInfo, JobRecord, JobStatus};
use bqwatch_core::dto::job::JobFilter;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use super::{JobStore, StoreError, list_limit, pending_cutoff};

#[derive(Default)]
pub struct MemoryJobStore {
    records: Mutex<HashMap<String, JobRecord>>,
    update_calls: AtomicUsize,
    unavailable: AtomicBool,
    failing_updates: Mutex<HashSet<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without going through `insert`
    pub fn with_records(records: impl IntoIterator<Item = JobRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.lock().unwrap();
            for record in records {
                map.insert(record.job_id.clone(), record);
            }
        }
        store
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobRecord> {
        self.records.lock().unwrap().get(job_id).cloned()
    }

    /// Number of `update_status` calls, including rejected ones
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Makes every call fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Makes `update_status` fail with `Unavailable` for one job
    pub fn fail_updates_for(&self, job_id: &str) {
        self.failing_updates
            .lock()
            .unwrap()
            .insert(job_id.to_string());
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, record: JobRecord) -> Result<JobRecord, StoreError> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.job_id) {
            return Err(StoreError::AlreadyExists(record.job_id));
        }
        records.insert(record.job_id.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        self.check_available()?;
        Ok(self.snapshot(job_id))
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        self.check_available()?;
        let records = self.records.lock().unwrap();
        let mut matching: Vec<JobRecord> = records
            .values()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.owner_id.as_ref().is_none_or(|o| &r.owner_id == o))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        matching.truncate(list_limit(filter));
        Ok(matching)
    }

    async fn query_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        self.check_available()?;
        let cutoff = pending_cutoff(older_than);
        let records = self.records.lock().unwrap();
        let mut pending: Vec<JobRecord> = records
            .values()
            .filter(|r| JobStatus::NON_TERMINAL.contains(&r.status))
            .filter(|r| cutoff.is_none_or(|c| r.updated_at <= c))
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        pending.truncate(limit);
        Ok(pending)
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_info: Option<ErrorInfo>,
    ) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.failing_updates.lock().unwrap().contains(job_id) {
            return Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut));
        }

        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if record.is_terminal() && record.status != status {
            return Err(StoreError::TerminalState {
                job_id: job_id.to_string(),
                status: record.status,
                requested: status,
            });
        }

        let now = Utc::now();
        let advanced = record.updated_at + chrono::Duration::microseconds(1);
        record.status = status;
        record.error_info = error_info;
        record.updated_at = now.max(advanced);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_is_write_once() {
        let store = MemoryJobStore::new();
        let record = JobRecord::new("j1", None, "conn-1", JobStatus::Pending);
        store.insert(record.clone()).await.unwrap();

        let err = store.insert(record).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(id) if id == "j1"));
    }

    #[tokio::test]
    async fn test_update_advances_updated_at() {
        let record = JobRecord::new("j1", None, "conn-1", JobStatus::Pending);
        let before = record.updated_at;
        let store = MemoryJobStore::with_records([record]);

        store
            .update_status("j1", JobStatus::Running, None)
            .await
            .unwrap();

        let stored = store.snapshot("j1").unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert!(stored.updated_at > before);
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let store = MemoryJobStore::with_records([JobRecord::new(
            "j1",
            None,
            "conn-1",
            JobStatus::Done,
        )]);

        // Same terminal value is accepted
        store
            .update_status("j1", JobStatus::Done, None)
            .await
            .unwrap();

        let err = store
            .update_status("j1", JobStatus::Running, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::TerminalState {
                status: JobStatus::Done,
                requested: JobStatus::Running,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_job() {
        let store = MemoryJobStore::new();
        let err = store
            .update_status("missing", JobStatus::Done, Some(ErrorInfo::new(json!({}))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_query_pending_skips_terminal_and_orders() {
        let mut older = JobRecord::new("b", None, "conn-1", JobStatus::Running);
        older.updated_at -= chrono::Duration::seconds(30);
        let newer = JobRecord::new("a", None, "conn-1", JobStatus::Pending);
        let done = JobRecord::new("c", None, "conn-1", JobStatus::Done);
        let store = MemoryJobStore::with_records([newer, older, done]);

        let pending = store.query_pending(Duration::ZERO, 10).await.unwrap();
        let ids: Vec<_> = pending.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let stale = store
            .query_pending(Duration::from_secs(10), 10)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].job_id, "b");

        let capped = store.query_pending(Duration::ZERO, 1).await.unwrap();
        assert_eq!(capped.len(), 1);
    }
}
