//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use dubhub_core::error::AppError;

/// Run `validator` checks and convert failures into a validation error.
pub fn validate_request<T: Validate>(req: &T) -> Result<(), AppError> {
    req.validate()
        .map_err(|e| AppError::validation(format!("Invalid request: {e}")))
}

/// Body of `POST /api/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateUrlJobRequest {
    /// YouTube video URL.
    #[validate(length(min = 1, message = "source_url is required"))]
    pub source_url: String,
    /// `cloud` or `pc`.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
}

/// Query of `POST /api/jobs/upload`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadQuery {
    /// `cloud` or `pc`.
    #[validate(length(min = 1, message = "target is required"))]
    pub target: String,
}

/// Query of `GET /api/jobs/next`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NextJobQuery {
    /// Polling worker's identity.
    #[validate(length(min = 1, max = 200, message = "worker_id is required"))]
    pub worker_id: String,
    /// Declared capability, `cloud` or `pc`.
    pub class: Option<String>,
}

/// Body of `POST /api/jobs/{id}/claim`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClaimRequest {
    #[validate(length(min = 1, max = 200, message = "worker_id is required"))]
    pub worker_id: String,
}

/// Body of `POST /api/jobs/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompleteRequest {
    /// Reporting worker; must hold the lease.
    #[validate(length(min = 1, max = 200, message = "worker_id is required"))]
    pub worker_id: String,
    /// Whether processing succeeded.
    pub success: bool,
    /// Output reference for a successful run.
    pub output_path: Option<String>,
    /// Failure description.
    pub error_message: Option<String>,
}

/// Query of `POST /api/jobs/{id}/result`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ResultQuery {
    #[validate(length(min = 1, max = 200, message = "worker_id is required"))]
    pub worker_id: String,
}
