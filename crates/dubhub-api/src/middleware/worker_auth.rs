//! Shared-key check for worker endpoints.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use dubhub_core::error::AppError;

use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the worker key.
pub const WORKER_KEY_HEADER: &str = "x-api-key";

/// Rejects requests whose `X-API-Key` does not match `worker.api_key`.
pub async fn require_worker_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(WORKER_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if keys_match(key, &state.config.worker.api_key) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected worker request with invalid key");
            ApiError(AppError::unauthorized("Invalid worker API key")).into_response()
        }
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(provided: &str, expected: &str) -> bool {
    let (a, b) = (provided.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
