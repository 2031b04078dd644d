//! Worker runner: the loop that polls for jobs and processes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use dubhub_core::config::worker::WorkerConfig;
use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::traits::MediaPipeline;
use dubhub_core::traits::storage::is_remote_source;
use dubhub_entity::job::WorkerClass;

use crate::client::{ApiClient, RemoteJob};

/// Attempts at delivering a failure report before the job is abandoned.
const REPORT_ATTEMPTS: u32 = 3;
/// Delay before the first retry; doubles after each attempt.
const REPORT_BACKOFF: Duration = Duration::from_millis(500);

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing was pending for this worker.
    Idle,
    /// A job was processed and its result uploaded.
    Completed,
    /// A job was processed and its failure reported.
    Failed,
}

/// Polls the coordinator and runs one job at a time.
#[derive(Debug)]
pub struct WorkerRunner {
    client: ApiClient,
    pipeline: Arc<dyn MediaPipeline>,
    worker_id: String,
    class: WorkerClass,
    poll_interval: Duration,
}

impl WorkerRunner {
    /// Build a runner from configuration.
    pub fn new(config: &WorkerConfig, pipeline: Arc<dyn MediaPipeline>) -> AppResult<Self> {
        let class: WorkerClass = config
            .class
            .trim()
            .to_ascii_lowercase()
            .parse::<WorkerClass>()
            .map_err(AppError::configuration)?;

        let worker_id = config
            .worker_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| default_worker_id(class));

        Ok(Self {
            client: ApiClient::new(config)?,
            pipeline,
            worker_id,
            class,
            poll_interval: Duration::from_secs(config.poll_interval_seconds),
        })
    }

    /// This worker's identity.
    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Poll until `cancel` flips to `true`. An in-flight job always runs to
    /// the end so it is never left without a report.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        info!(
            worker_id = %self.worker_id,
            class = %self.class,
            pipeline = self.pipeline.name(),
            poll_interval_seconds = self.poll_interval.as_secs(),
            "Worker started"
        );

        loop {
            if *cancel.borrow() {
                break;
            }

            let outcome = match self.poll_once().await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(worker_id = %self.worker_id, error = %e, "Poll failed");
                    PollOutcome::Idle
                }
            };

            // Only sleep when there was nothing to do.
            if outcome != PollOutcome::Idle {
                continue;
            }

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = time::sleep(self.poll_interval) => {}
            }
        }

        info!(worker_id = %self.worker_id, "Worker shut down");
    }

    /// Lease at most one job and process it.
    pub async fn poll_once(&self) -> AppResult<PollOutcome> {
        let Some(job) = self.client.next_job(&self.worker_id, self.class).await? else {
            return Ok(PollOutcome::Idle);
        };

        info!(job_id = %job.id, worker_id = %self.worker_id, target = %job.target, "Processing job");

        match self.process(&job).await {
            Ok(()) => {
                info!(job_id = %job.id, "Job completed");
                Ok(PollOutcome::Completed)
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Job failed");
                self.report_failure(&job, &e.message).await?;
                Ok(PollOutcome::Failed)
            }
        }
    }

    /// Deliver a failure report, retrying transport and server errors.
    async fn report_failure(&self, job: &RemoteJob, message: &str) -> AppResult<()> {
        let mut delay = REPORT_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.client.report_failure(job.id, &self.worker_id, message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < REPORT_ATTEMPTS && e.kind == ErrorKind::Internal => {
                    warn!(job_id = %job.id, attempt, error = %e, "Failure report not delivered, retrying");
                    time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        job_id = %job.id,
                        worker_id = %self.worker_id,
                        error = %e,
                        "Failure report not delivered, abandoning job"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn process(&self, job: &RemoteJob) -> AppResult<()> {
        let workdir = tempfile::Builder::new()
            .prefix(&format!("dubhub-{}-", job.id))
            .tempdir()?;

        let input = if is_remote_source(&job.input_path) {
            job.input_path.clone()
        } else {
            let path = workdir.path().join(format!("{}_input.mp4", job.id));
            self.client.download_input(job, &path).await?;
            path.to_string_lossy().into_owned()
        };

        let output = workdir.path().join(format!("{}_output.mp4", job.id));
        self.pipeline.process(&input, &output).await?;

        if !tokio::fs::try_exists(&output).await? {
            return Err(AppError::pipeline("pipeline produced no output"));
        }

        self.client
            .upload_result(job.id, &self.worker_id, &output)
            .await
    }
}

fn default_worker_id(class: WorkerClass) -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "host".to_string());
    format!("{class}-{host}-{}", std::process::id())
}
