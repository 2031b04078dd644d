//! Worker endpoints. All routes here sit behind the worker key.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use bytes::Bytes;

use dubhub_core::error::AppError;
use dubhub_entity::job::WorkerClass;

use crate::dto::request::{
    ClaimRequest, CompleteRequest, NextJobQuery, ResultQuery, validate_request,
};
use crate::dto::response::{ApiResponse, JobStatusResponse, NextJobResponse, WorkerJobResponse};
use crate::error::ApiError;
use crate::extractors::parse_job_id;
use crate::handlers::{body_bytes, stream_artifact};
use crate::state::AppState;

/// GET /api/jobs/next?worker_id=...&class=...
pub async fn next_job(
    State(state): State<AppState>,
    Query(query): Query<NextJobQuery>,
) -> Result<Json<ApiResponse<NextJobResponse>>, ApiError> {
    validate_request(&query)?;
    let declared = query
        .class
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| c.trim().to_ascii_lowercase().parse::<WorkerClass>())
        .transpose()
        .map_err(AppError::validation)?;

    let job = state.lease.claim_next(&query.worker_id, declared).await?;
    Ok(Json(ApiResponse::ok(NextJobResponse {
        job: job.map(WorkerJobResponse::from),
    })))
}

/// POST /api/jobs/{id}/claim
pub async fn claim_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ClaimRequest>,
) -> Result<Json<ApiResponse<WorkerJobResponse>>, ApiError> {
    validate_request(&req)?;
    let id = parse_job_id(&id)?;

    if !state.lease.claim_by_id(id, &req.worker_id).await? {
        // Distinguish a missing job from a lost race.
        let job = state.jobs.status(id).await?;
        return Err(AppError::conflict(format!("Job {id} is already {}", job.status)).into());
    }

    let job = state.jobs.status(id).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/complete
pub async fn complete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<ApiResponse<JobStatusResponse>>, ApiError> {
    validate_request(&req)?;
    let id = parse_job_id(&id)?;

    let job = state
        .jobs
        .report_result(id, &req.worker_id, req.success, req.output_path, req.error_message)
        .await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// POST /api/jobs/{id}/result?worker_id=...
pub async fn upload_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ApiResponse<JobStatusResponse>>, ApiError> {
    validate_request(&query)?;
    let id = parse_job_id(&id)?;
    let data = body_bytes(body)?;

    let job = state.jobs.upload_result(id, &query.worker_id, data).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// GET /api/jobs/{id}/input
pub async fn download_input(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let (stream, size) = state.jobs.open_input(id).await?;
    Ok(stream_artifact(stream, size, format!("{id}_input.mp4"))?)
}
