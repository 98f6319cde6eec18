use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tracked jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bq_jobs (
            job_id TEXT PRIMARY KEY,
            location TEXT,
            owner_id TEXT NOT NULL,
            status VARCHAR(16) NOT NULL,
            error_info JSONB,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Poller scans only non-terminal rows, oldest update first
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_bq_jobs_pending
        ON bq_jobs(updated_at)
        WHERE status IN ('PENDING', 'RUNNING')
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_bq_jobs_owner ON bq_jobs(owner_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
