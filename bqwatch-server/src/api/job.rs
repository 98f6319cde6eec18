//! Job API Handlers
//!
//! HTTP endpoints for registering and inspecting tracked jobs.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
};
use bqwatch_core::domain::job::{JobRecord, JobStatus};
use bqwatch_core::dto::job::{JobFilter, RegisterJob};
use serde::Deserialize;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::service::job_service;

/// POST /api/jobs
/// Start tracking a submitted job
pub async fn register_job(
    State(state): State<AppState>,
    Json(req): Json<RegisterJob>,
) -> ApiResult<(StatusCode, Json<JobRecord>)> {
    tracing::debug!("Registering job: {}", req.job_id);

    let job = job_service::register_job(state.store.as_ref(), req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /api/jobs/{job_id}
/// Get the stored record of a tracked job
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    tracing::debug!("Getting job: {}", job_id);

    let job = job_service::get_job(state.store.as_ref(), &job_id).await?;

    Ok(Json(job))
}

/// GET /api/jobs
/// List tracked jobs, newest first
///
/// Query parameters:
/// - `status` (optional): PENDING, RUNNING, DONE or ERROR
/// - `owner_id` (optional): Only jobs submitted by this owner
/// - `limit` (optional): Page size, capped by the store
pub async fn list_jobs(
    State(state): State<AppState>,
    params: Result<Query<ListJobsQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<JobRecord>>> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let filter = JobFilter {
        status,
        owner_id: params.owner_id,
        limit: params.limit,
    };

    tracing::debug!("Listing jobs: {:?}", filter);

    let jobs = job_service::list_jobs(state.store.as_ref(), &filter).await?;

    Ok(Json(jobs))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<usize>,
}
