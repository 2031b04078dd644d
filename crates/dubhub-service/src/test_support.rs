//! Shared fixtures for service tests.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use dubhub_core::config::database::DatabaseConfig;
use dubhub_core::error::AppError;
use dubhub_core::result::AppResult;
use dubhub_core::traits::{ArtifactStorage, MediaPipeline};
use dubhub_core::types::JobId;
use dubhub_database::migration::run_migrations;
use dubhub_database::repositories::{AdmissionRepository, JobRepository};
use dubhub_database::DatabasePool;
use dubhub_entity::job::{Job, JobStatus};
use dubhub_storage::LocalArtifactStorage;

pub struct TestContext {
    pub job_repo: Arc<JobRepository>,
    pub admission_repo: Arc<AdmissionRepository>,
    pub storage: Arc<LocalArtifactStorage>,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = DatabaseConfig {
            url: format!("sqlite://{}", dir.path().join("jobs.db").display()),
            ..DatabaseConfig::default()
        };
        let db = DatabasePool::connect(&config).await.expect("connect");
        run_migrations(db.pool()).await.expect("migrate");

        let data_root = dir.path().join("artifacts");
        let storage = LocalArtifactStorage::new(&data_root.to_string_lossy())
            .await
            .expect("storage");

        Self {
            job_repo: Arc::new(JobRepository::new(db.pool().clone())),
            admission_repo: Arc::new(AdmissionRepository::new(db.pool().clone())),
            storage: Arc::new(storage),
            _dir: dir,
        }
    }

    pub fn storage_dyn(&self) -> Arc<dyn ArtifactStorage> {
        self.storage.clone()
    }

    /// Poll until the job leaves PENDING/PROCESSING or disappears.
    pub async fn wait_terminal(&self, id: JobId) -> Option<Job> {
        for _ in 0..200 {
            match self.job_repo.find_by_id(id).await.expect("find") {
                Some(job) if job.status.is_terminal() => return Some(job),
                None => return None,
                Some(_) => tokio::time::sleep(Duration::from_millis(25)).await,
            }
        }
        panic!("job {id} never reached a terminal status");
    }
}

/// Pipeline that copies the input (or writes a marker for URLs), or fails.
#[derive(Debug, Default)]
pub struct FakePipeline {
    pub fail_with: Option<String>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakePipeline {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaPipeline for FakePipeline {
    fn name(&self) -> &str {
        "fake"
    }

    async fn process(&self, input: &str, output: &Path) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            tokio::fs::write(output, b"partial").await?;
            return Err(AppError::pipeline(message.clone()));
        }
        let data = match tokio::fs::read(input).await {
            Ok(data) => data,
            Err(_) => input.as_bytes().to_vec(),
        };
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

pub fn assert_status(job: &Job, status: JobStatus) {
    assert_eq!(job.status, status, "job {} has unexpected status", job.id);
}
