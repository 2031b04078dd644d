//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use dubhub_core::types::JobId;

use super::status::JobStatus;
use super::target::JobTarget;

/// A media job row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Current job status.
    pub status: JobStatus,
    /// Worker population allowed to claim the job.
    pub target: JobTarget,
    /// Storage key of the uploaded input, or the source URL.
    pub input_path: String,
    /// Storage key of the produced output; set only once completed.
    pub output_path: Option<String>,
    /// Worker currently (or last) holding the job.
    pub worker_id: Option<String>,
    /// Error message; set only once failed.
    pub error_message: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Whether `worker_id` currently holds this job's lease.
    pub fn is_held_by(&self, worker_id: &str) -> bool {
        self.status == JobStatus::Processing && self.worker_id.as_deref() == Some(worker_id)
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    /// Pre-generated identifier (the upload is stored under it first).
    pub id: JobId,
    /// Storage key or source URL.
    pub input_path: String,
    /// Requested target.
    pub target: JobTarget,
}

/// Unconditional status overwrite, for callers that already own the job.
#[derive(Debug, Clone)]
pub struct UpdateJobStatus {
    /// New status.
    pub status: JobStatus,
    /// Output key (completed jobs).
    pub output_path: Option<String>,
    /// Error message (failed jobs).
    pub error_message: Option<String>,
    /// New holder; `None` keeps the current value.
    pub worker_id: Option<String>,
}

impl UpdateJobStatus {
    /// Mark completed with the given output key.
    pub fn completed(output_path: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            output_path: Some(output_path.into()),
            error_message: None,
            worker_id: None,
        }
    }

    /// Mark failed with the given message.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            output_path: None,
            error_message: Some(error_message.into()),
            worker_id: None,
        }
    }
}

/// Terminal result reported by the lease holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Processing succeeded and produced the given output key.
    Completed {
        /// Output storage key.
        output_path: String,
    },
    /// Processing failed.
    Failed {
        /// Human-readable error.
        error_message: String,
    },
}

impl JobOutcome {
    /// Status this outcome transitions to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
        }
    }
}

impl From<JobOutcome> for UpdateJobStatus {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed { output_path } => Self::completed(output_path),
            JobOutcome::Failed { error_message } => Self::failed(error_message),
        }
    }
}

/// Result of asking the coordinator to process a job itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackOutcome {
    /// The job was claimed and handed to the fallback processor.
    Started,
    /// Another worker holds the job (or won the claim race).
    AlreadyProcessing,
    /// The job already finished successfully.
    AlreadyCompleted,
    /// The job failed already or targets a population the fallback is not part of.
    Rejected,
}
