//! Client-facing job endpoints.

use axum::Json;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::dto::request::{CreateUrlJobRequest, UploadQuery, validate_request};
use crate::dto::response::{
    ApiResponse, CreateJobResponse, FallbackResponse, JobStatusResponse, MessageResponse,
};
use crate::error::ApiError;
use crate::extractors::{ClientIp, parse_job_id};
use crate::handlers::{body_bytes, parse_target, stream_artifact};
use crate::state::AppState;

/// POST /api/jobs/upload?target=cloud|pc
pub async fn upload_job(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Query(query): Query<UploadQuery>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CreateJobResponse>>), ApiError> {
    validate_request(&query)?;
    let target = parse_target(&query.target)?;
    let data = body_bytes(body)?;

    let job = state.jobs.create_from_upload(&ip, target, data).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(job.into()))))
}

/// POST /api/jobs
pub async fn create_url_job(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(req): Json<CreateUrlJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateJobResponse>>), ApiError> {
    validate_request(&req)?;
    let target = parse_target(&req.target)?;

    let job = state.jobs.create_from_url(&ip, target, &req.source_url).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(job.into()))))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<JobStatusResponse>>, ApiError> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.status(id).await?;
    Ok(Json(ApiResponse::ok(job.into())))
}

/// GET /api/jobs/{id}/download
pub async fn download_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let (stream, size) = state.jobs.open_result(id).await?;
    Ok(stream_artifact(stream, size, format!("{id}_output.mp4"))?)
}

/// DELETE /api/jobs/{id}
pub async fn discard_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    if state.jobs.discard(id).await? {
        Ok(Json(ApiResponse::ok(MessageResponse {
            message: format!("Job {id} discarded"),
        }))
        .into_response())
    } else {
        Ok(StatusCode::NO_CONTENT.into_response())
    }
}

/// POST /api/jobs/{id}/fallback
pub async fn escalate_fallback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<FallbackResponse>>, ApiError> {
    let id = parse_job_id(&id)?;
    let outcome = state.jobs.escalate_fallback(id).await?;
    Ok(Json(ApiResponse::ok(FallbackResponse {
        job_id: id,
        outcome,
    })))
}
