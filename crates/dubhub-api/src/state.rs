//! Shared application state passed to every handler.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::info;

use dubhub_core::config::AppConfig;
use dubhub_core::result::AppResult;
use dubhub_core::traits::{ArtifactStorage, MediaPipeline};
use dubhub_database::DatabasePool;
use dubhub_database::repositories::{AdmissionRepository, JobRepository};
use dubhub_service::{AdmissionGate, FallbackSupervisor, JobService, LeaseCoordinator};
use dubhub_storage::LocalArtifactStorage;

/// Application state, cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Database pool (health checks).
    pub db: DatabasePool,
    /// Job lifecycle service.
    pub jobs: Arc<JobService>,
    /// Lease coordinator for polling workers.
    pub lease: Arc<LeaseCoordinator>,
    /// Fallback supervisor, when fallback is enabled.
    pub fallback: Option<Arc<FallbackSupervisor>>,
    /// Process start time.
    pub started_at: Instant,
}

impl AppState {
    /// Wire repositories and services on top of an already migrated pool.
    ///
    /// The fallback supervisor (if enabled) stops when `cancel` flips to
    /// `true`.
    pub async fn build(
        config: AppConfig,
        db: DatabasePool,
        pipeline: Arc<dyn MediaPipeline>,
        cancel: watch::Receiver<bool>,
    ) -> AppResult<Self> {
        let job_repo = Arc::new(JobRepository::new(db.pool().clone()));
        let admission_repo = Arc::new(AdmissionRepository::new(db.pool().clone()));

        let storage: Arc<dyn ArtifactStorage> =
            Arc::new(LocalArtifactStorage::new(&config.storage.data_root).await?);

        let admission = Arc::new(AdmissionGate::new(admission_repo, &config.admission));
        let lease = Arc::new(LeaseCoordinator::new(
            Arc::clone(&job_repo),
            config.lease.clone(),
        ));

        let fallback = if config.fallback.enabled {
            let supervisor = FallbackSupervisor::start(
                Arc::clone(&job_repo),
                Arc::clone(&storage),
                pipeline,
                &config.fallback,
                cancel,
            )?;
            let recovered = supervisor.recover().await?;
            if recovered > 0 {
                info!(recovered, "Recovered stranded fallback jobs");
            }
            Some(supervisor)
        } else {
            None
        };

        let jobs = Arc::new(JobService::new(
            job_repo,
            admission,
            storage,
            fallback.clone(),
            config.storage.max_upload_size_bytes,
        ));

        Ok(Self {
            config: Arc::new(config),
            db,
            jobs,
            lease,
            fallback,
            started_at: Instant::now(),
        })
    }
}
