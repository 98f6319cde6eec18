//! bqwatch Server
//!
//! Tracks BigQuery jobs submitted on behalf of clients and keeps their stored
//! status in line with what BigQuery reports.
//!
//! Architecture:
//! - Configuration: Command-line flags with environment fallbacks
//! - Repository: PostgreSQL job store
//! - Scheduler: Background poller reconciling non-terminal jobs
//! - API: Registration and lookup of tracked jobs over HTTP

mod api;
mod config;
mod db;
mod repository;
mod scheduler;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Config, PollerConfig};
use crate::repository::{JobStore, PgJobStore};
use crate::scheduler::JobPoller;
use bqwatch_client::{BigQueryClient, RemoteJobClient, RetryPolicy, RetryingClient};

#[derive(Parser)]
#[command(name = "bqwatch-server")]
#[command(about = "Tracks BigQuery jobs and reconciles their status", long_about = None)]
struct Cli {
    /// PostgreSQL connection string for the job store
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Address the HTTP API binds to
    #[arg(long, env = "BQWATCH_BIND_ADDR", default_value = "127.0.0.1:8080")]
    bind_addr: String,

    /// Project the tracked jobs belong to
    #[arg(long, env = "BQWATCH_PROJECT_ID")]
    project_id: String,

    /// BigQuery REST base URL
    #[arg(long, env = "BQWATCH_BIGQUERY_URL", default_value = bqwatch_client::DEFAULT_BASE_URL)]
    bigquery_url: String,

    /// OAuth2 access token sent to BigQuery
    #[arg(long, env = "BQWATCH_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// Require `Authorization: Bearer <key>` on /api routes
    #[arg(long, env = "BQWATCH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Seconds between two poll cycles
    #[arg(long, env = "BQWATCH_POLL_INTERVAL", default_value_t = 60)]
    poll_interval: u64,

    /// Maximum jobs checked per poll cycle
    #[arg(long, env = "BQWATCH_PENDING_JOB_QUERY_LIMIT", default_value_t = 50)]
    pending_job_query_limit: usize,

    /// Only poll jobs not updated for this many seconds
    #[arg(long, env = "BQWATCH_PENDING_MIN_AGE", default_value_t = 0)]
    pending_min_age: u64,

    /// Maximum status requests in flight at once
    #[arg(long, env = "BQWATCH_MAX_CONCURRENT_POLLS", default_value_t = 8)]
    max_concurrent_polls: usize,

    /// Per-request timeout for BigQuery calls, in seconds
    #[arg(long, env = "BQWATCH_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Attempts per status request, including the first
    #[arg(long, env = "BQWATCH_RETRY_ATTEMPTS", default_value_t = 3)]
    retry_attempts: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "BQWATCH_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.database_url, self.project_id);
        config.bind_addr = self.bind_addr;
        config.bigquery_url = self.bigquery_url;
        config.access_token = self.access_token;
        config.api_key = self.api_key;
        config.poller = PollerConfig {
            poll_interval: Duration::from_secs(self.poll_interval),
            pending_job_query_limit: self.pending_job_query_limit,
            pending_min_age: Duration::from_secs(self.pending_min_age),
            max_concurrent_polls: self.max_concurrent_polls,
        };
        config.retry = RetryPolicy {
            max_attempts: self.retry_attempts,
            attempt_timeout: Duration::from_secs(self.request_timeout),
            ..RetryPolicy::default()
        };
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    info!("Starting bqwatch server");

    let config = cli.into_config();
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: project_id={}, bigquery_url={}, bind_addr={}",
        config.project_id, config.bigquery_url, config.bind_addr
    );

    // Pre-flight: the store must be reachable before anything is served
    info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(pool));
    let client = build_remote_client(&config)?;

    let shutdown = CancellationToken::new();

    let poller = JobPoller::new(config.poller.clone(), Arc::clone(&store), client);
    let poller_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { poller.run(shutdown).await }
    });

    if config.api_key.is_none() {
        info!("No API key configured, /api routes are open");
    }
    let app = api::create_router(AppState::new(store, config.api_key.clone()));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                info!("Shutdown signal received");
                shutdown.cancel();
            }
        })
        .await;

    // The server may also stop on its own; the poller must follow
    shutdown.cancel();
    if let Err(e) = poller_handle.await {
        error!("Poller task failed: {}", e);
    }

    serve_result.context("HTTP server error")?;
    info!("bqwatch server stopped");
    Ok(())
}

fn init_tracing(debug: bool, json: bool) {
    let default_filter = if debug {
        "bqwatch_server=debug,bqwatch_client=debug,tower_http=debug"
    } else {
        "bqwatch_server=info,bqwatch_client=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Builds the BigQuery client shared by all poll tasks
fn build_remote_client(config: &Config) -> Result<Arc<dyn RemoteJobClient>> {
    let http = reqwest::Client::builder()
        .timeout(config.retry.attempt_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let mut client =
        BigQueryClient::with_client(config.bigquery_url.clone(), config.project_id.clone(), http);
    if let Some(token) = &config.access_token {
        client = client.with_access_token(token.clone());
    }

    Ok(Arc::new(RetryingClient::new(client, config.retry.clone())))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
