//! Job repository: the durable job store and the lease claim.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::types::JobId;
use dubhub_entity::job::{CreateJob, Job, JobOutcome, JobStatus, JobTarget, UpdateJobStatus};

/// Repository for job CRUD and queue operations.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new PENDING job.
    pub async fn create(&self, data: &CreateJob) -> AppResult<Job> {
        let now = Utc::now();
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (id, status, target, input_path, created_at, updated_at) \
             VALUES (?, 'pending', ?, ?, ?, ?) RETURNING *",
        )
        .bind(data.id)
        .bind(data.target)
        .bind(&data.input_path)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create job", e))
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    /// Delete a job regardless of status. Returns `false` if it was absent.
    pub async fn delete(&self, id: JobId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete job", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite a job's status fields without checking the current state.
    ///
    /// Only for callers that already hold the job exclusively. Returns
    /// `false` when the row no longer exists.
    pub async fn update_status(&self, id: JobId, data: &UpdateJobStatus) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, output_path = ?, error_message = ?, \
             worker_id = COALESCE(?, worker_id), updated_at = ? WHERE id = ?",
        )
        .bind(data.status)
        .bind(data.output_path.as_deref())
        .bind(data.error_message.as_deref())
        .bind(data.worker_id.as_deref())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update job status", e)
        })?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a PROCESSING job held by `claimant` to its terminal state.
    ///
    /// Returns `false` without touching the row when the job is not
    /// PROCESSING or is held by someone else.
    pub async fn finish(&self, id: JobId, claimant: &str, outcome: &JobOutcome) -> AppResult<bool> {
        let (output_path, error_message) = match outcome {
            JobOutcome::Completed { output_path } => (Some(output_path.as_str()), None),
            JobOutcome::Failed { error_message } => (None, Some(error_message.as_str())),
        };

        let result = sqlx::query(
            "UPDATE jobs SET status = ?, output_path = ?, error_message = ?, updated_at = ? \
             WHERE id = ? AND status = 'processing' AND worker_id = ?",
        )
        .bind(outcome.status())
        .bind(output_path)
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .bind(claimant)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to finish job", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically lease the oldest PENDING job whose target is in `targets`.
    ///
    /// The selection and the conditional write are one statement inside a
    /// transaction, so SQLite holds the write lock across both and no two
    /// callers can receive the same job. `None` means nothing was eligible;
    /// the caller decides whether to poll again.
    pub async fn claim_next(&self, worker_id: &str, targets: &[JobTarget]) -> AppResult<Option<Job>> {
        if targets.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; targets.len()].join(", ");
        let sql = format!(
            "UPDATE jobs SET status = 'processing', worker_id = ?, updated_at = ? \
             WHERE id = ( \
                SELECT id FROM jobs \
                WHERE status = 'pending' AND target IN ({placeholders}) \
                ORDER BY created_at ASC, rowid ASC \
                LIMIT 1 \
             ) AND status = 'pending' RETURNING *"
        );

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin claim transaction", e)
        })?;

        let mut query = sqlx::query_as::<_, Job>(&sql).bind(worker_id).bind(Utc::now());
        for target in targets {
            query = query.bind(*target);
        }

        let claimed = query
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))?;

        match claimed {
            Some(job) => {
                tx.commit().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to commit claim", e)
                })?;
                debug!(job_id = %job.id, worker_id, target = %job.target, "Job claimed");
                Ok(Some(job))
            }
            None => {
                tx.rollback().await.map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to roll back claim", e)
                })?;
                Ok(None)
            }
        }
    }

    /// Lease one specific job if it is still PENDING.
    pub async fn claim_by_id(&self, id: JobId, worker_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'processing', worker_id = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(worker_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))?;
        Ok(result.rows_affected() > 0)
    }

    /// Count jobs per status. Statuses with no jobs are omitted.
    pub async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    /// Most recently created jobs, optionally restricted to one status.
    pub async fn list_recent(&self, status: Option<JobStatus>, limit: i64) -> AppResult<Vec<Job>> {
        let query = match status {
            Some(status) => sqlx::query_as::<_, Job>(
                "SELECT * FROM jobs WHERE status = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
            )
            .bind(status),
            None => sqlx::query_as::<_, Job>(
                "SELECT * FROM jobs ORDER BY created_at DESC, rowid DESC LIMIT ?",
            ),
        };

        query
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list jobs", e))
    }

    /// Jobs currently leased by `worker_id`, oldest first.
    pub async fn find_processing_by_worker(&self, worker_id: &str) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE status = 'processing' AND worker_id = ? \
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find processing jobs", e)
        })
    }
}
