//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dubhub_core::types::JobId;
use dubhub_entity::job::{FallbackOutcome, Job, JobStatus, JobTarget};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Client-facing view of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub target: JobTarget,
    /// Present once the job is completed.
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let download_url =
            (job.status == JobStatus::Completed).then(|| format!("/api/jobs/{}/download", job.id));
        Self {
            id: job.id,
            status: job.status,
            target: job.target,
            download_url,
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Returned by both job-creation endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: JobId,
    /// Always `"queued"`.
    pub status: String,
    pub target: JobTarget,
}

impl From<Job> for CreateJobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: "queued".to_string(),
            target: job.target,
        }
    }
}

/// A job handed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerJobResponse {
    pub id: JobId,
    pub target: JobTarget,
    /// Storage key or source URL.
    pub input_path: String,
    /// Where to fetch the input: the source URL, or the input download route.
    pub input_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<Job> for WorkerJobResponse {
    fn from(job: Job) -> Self {
        let input_url = if dubhub_core::traits::storage::is_remote_source(&job.input_path) {
            job.input_path.clone()
        } else {
            format!("/api/jobs/{}/input", job.id)
        };
        Self {
            id: job.id,
            target: job.target,
            input_path: job.input_path,
            input_url,
            created_at: job.created_at,
        }
    }
}

/// Response of `GET /api/jobs/next`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextJobResponse {
    /// `None` when nothing is pending for this worker.
    pub job: Option<WorkerJobResponse>,
}

/// Response of `POST /api/jobs/{id}/fallback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResponse {
    pub job_id: JobId,
    pub outcome: FallbackOutcome,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Database reachability.
    pub database: String,
    /// Jobs currently run by the fallback.
    pub fallback_in_flight: usize,
    /// Server version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Plain message response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
