//! Lease coordination: which worker may claim which job.

use std::sync::Arc;

use tracing::{debug, info};

use dubhub_core::config::lease::LeaseConfig;
use dubhub_core::result::AppResult;
use dubhub_core::types::JobId;
use dubhub_database::repositories::JobRepository;
use dubhub_entity::job::{Job, JobTarget, WorkerClass};

/// Hands PENDING jobs to polling workers, one claimant per job.
#[derive(Debug, Clone)]
pub struct LeaseCoordinator {
    jobs: Arc<JobRepository>,
    config: LeaseConfig,
}

impl LeaseCoordinator {
    /// Create a coordinator over the job store.
    pub fn new(jobs: Arc<JobRepository>, config: LeaseConfig) -> Self {
        Self { jobs, config }
    }

    /// Guess a worker's class from its identity, for workers that do not
    /// declare one.
    pub fn infer_class(&self, worker_id: &str) -> Option<WorkerClass> {
        let id = worker_id.to_ascii_lowercase();
        let matches = |prefixes: &[String]| {
            prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && id.starts_with(&prefix.to_ascii_lowercase()))
        };

        if matches(&self.config.cloud_prefixes) {
            Some(WorkerClass::Cloud)
        } else if matches(&self.config.pc_prefixes) {
            Some(WorkerClass::Pc)
        } else {
            None
        }
    }

    /// Targets a worker may claim.
    ///
    /// A declared class wins. Otherwise the class is inferred from the
    /// identity; an unrecognized identity only sees `any` jobs unless the
    /// permissive legacy mode is on.
    pub fn allowed_targets(&self, worker_id: &str, declared: Option<WorkerClass>) -> Vec<JobTarget> {
        match declared.or_else(|| self.infer_class(worker_id)) {
            Some(class) => class.allowed_targets(),
            None if self.config.permissive_unknown_workers => {
                vec![JobTarget::Any, JobTarget::Cloud, JobTarget::Pc]
            }
            None => vec![JobTarget::Any],
        }
    }

    /// Lease the oldest eligible PENDING job for `worker_id`.
    ///
    /// `None` means no job was available; it is never retried here.
    pub async fn claim_next(
        &self,
        worker_id: &str,
        declared: Option<WorkerClass>,
    ) -> AppResult<Option<Job>> {
        let targets = self.allowed_targets(worker_id, declared);
        let claimed = self.jobs.claim_next(worker_id, &targets).await?;

        match &claimed {
            Some(job) => info!(
                job_id = %job.id,
                worker_id,
                target = %job.target,
                "Job leased"
            ),
            None => debug!(worker_id, ?targets, "No job available"),
        }
        Ok(claimed)
    }

    /// Lease one specific job. `false` means it was no longer PENDING.
    pub async fn claim_by_id(&self, id: JobId, worker_id: &str) -> AppResult<bool> {
        let claimed = self.jobs.claim_by_id(id, worker_id).await?;
        if claimed {
            info!(job_id = %id, worker_id, "Job leased by id");
        }
        Ok(claimed)
    }
}
