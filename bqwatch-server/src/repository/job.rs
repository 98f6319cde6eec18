//! Job Repository
//!
//! PostgreSQL-backed `JobStore`. Every write is a single autocommit
//! statement, so it is durable once the future resolves.

use async_trait::async_trait;
use bqwatch_core::domain::job::{ErrorInfo, JobRecord, JobStatus};
use bqwatch_core::dto::job::JobFilter;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{JobStore, StoreError, list_limit, pending_cutoff};

/// Job store backed by the `bq_jobs` table
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM bq_jobs WHERE job_id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(status.map(|s| string_to_status(&s)))
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, record: JobRecord) -> Result<JobRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO bq_jobs (job_id, location, owner_id, status, error_info, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.job_id)
        .bind(&record.location)
        .bind(&record.owner_id)
        .bind(record.status.as_str())
        .bind(record.error_info.clone().map(ErrorInfo::into_value))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::AlreadyExists(record.job_id.clone())
            }
            other => StoreError::Unavailable(other),
        })?;

        Ok(record)
    }

    async fn get(&self, job_id: &str) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, location, owner_id, status, error_info, created_at, updated_at
            FROM bq_jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, location, owner_id, status, error_info, created_at, updated_at
            FROM bq_jobs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR owner_id = $2)
            ORDER BY created_at DESC, job_id ASC
            LIMIT $3
            "#,
        )
        .bind(filter.status.map(JobStatus::as_str))
        .bind(&filter.owner_id)
        .bind(list_limit(filter) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn query_pending(
        &self,
        older_than: Duration,
        limit: usize,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, location, owner_id, status, error_info, created_at, updated_at
            FROM bq_jobs
            WHERE status IN ('PENDING', 'RUNNING')
              AND ($1::timestamptz IS NULL OR updated_at <= $1)
            ORDER BY updated_at ASC, job_id ASC
            LIMIT $2
            "#,
        )
        .bind(pending_cutoff(older_than))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        error_info: Option<ErrorInfo>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bq_jobs
            SET status = $2,
                error_info = $3,
                updated_at = GREATEST($4, updated_at + INTERVAL '1 microsecond')
            WHERE job_id = $1
              AND (status IN ('PENDING', 'RUNNING') OR status = $2)
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(error_info.map(ErrorInfo::into_value))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing matched: either the job is unknown or it is terminal
        match self.current_status(job_id).await? {
            None => Err(StoreError::NotFound(job_id.to_string())),
            Some(current) => Err(StoreError::TerminalState {
                job_id: job_id.to_string(),
                status: current,
                requested: status,
            }),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn string_to_status(s: &str) -> JobStatus {
    s.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown job status '{}' in bq_jobs, treating as PENDING", s);
        JobStatus::Pending
    })
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    job_id: String,
    location: Option<String>,
    owner_id: String,
    status: String,
    error_info: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        JobRecord {
            status: string_to_status(&row.status),
            job_id: row.job_id,
            location: row.location,
            owner_id: row.owner_id,
            error_info: row.error_info.map(ErrorInfo::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
