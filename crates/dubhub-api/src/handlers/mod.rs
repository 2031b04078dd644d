//! HTTP request handlers.

pub mod health;
pub mod jobs;
pub mod worker;

use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::http::{StatusCode, header};
use axum::response::Response;
use bytes::Bytes;

use dubhub_core::error::AppError;
use dubhub_core::traits::storage::ByteStream;
use dubhub_entity::job::JobTarget;

/// Convert a raw body rejection into a domain error.
pub(crate) fn body_bytes(body: Result<Bytes, BytesRejection>) -> Result<Bytes, AppError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::payload_too_large("Uploaded file exceeds the size limit")
        } else {
            AppError::validation(format!("Failed to read request body: {}", rejection.body_text()))
        }
    })
}

/// Parse a client-supplied target string.
pub(crate) fn parse_target(raw: &str) -> Result<JobTarget, AppError> {
    raw.trim()
        .to_ascii_lowercase()
        .parse::<JobTarget>()
        .map_err(AppError::validation)
}

/// Stream a stored artifact as an `video/mp4` attachment.
pub(crate) fn stream_artifact(
    stream: ByteStream,
    size: u64,
    filename: String,
) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::internal(format!("Response build failed: {e}")))
}
