//! In-process fallback processing.
//!
//! When a job is escalated, the coordinator leases it under a reserved
//! identity and hands its id to this supervisor through an unbounded queue.
//! The database claim already bounds how many ids can be queued.
//! A dispatcher task runs queued jobs under a concurrency limit; each run
//! always ends with the job COMPLETED, FAILED, or discarded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use dubhub_core::config::fallback::FallbackConfig;
use dubhub_core::error::AppError;
use dubhub_core::result::AppResult;
use dubhub_core::traits::storage::{is_remote_source, output_key};
use dubhub_core::traits::{ArtifactStorage, MediaPipeline};
use dubhub_core::types::JobId;
use dubhub_database::repositories::JobRepository;
use dubhub_entity::job::{Job, UpdateJobStatus, WorkerClass};

/// Everything a fallback run needs, shared between the dispatcher and the
/// per-job tasks.
#[derive(Debug)]
struct Runtime {
    jobs: Arc<JobRepository>,
    storage: Arc<dyn ArtifactStorage>,
    pipeline: Arc<dyn MediaPipeline>,
    worker_id: String,
    in_flight: Mutex<HashSet<JobId>>,
}

impl Runtime {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<JobId>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Removes a job from the in-flight set when its run ends, however it ends.
struct InFlightGuard {
    runtime: Arc<Runtime>,
    id: JobId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.runtime.in_flight().remove(&self.id);
    }
}

/// Supervised in-process worker used for fallback escalation.
#[derive(Debug)]
pub struct FallbackSupervisor {
    runtime: Arc<Runtime>,
    class: WorkerClass,
    sender: mpsc::UnboundedSender<JobId>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl FallbackSupervisor {
    /// Start the dispatcher task. It stops when `cancel` flips to `true`,
    /// then waits (bounded) for running jobs.
    pub fn start(
        jobs: Arc<JobRepository>,
        storage: Arc<dyn ArtifactStorage>,
        pipeline: Arc<dyn MediaPipeline>,
        config: &FallbackConfig,
        cancel: watch::Receiver<bool>,
    ) -> AppResult<Arc<Self>> {
        let class: WorkerClass = config
            .class
            .parse()
            .map_err(|e: String| AppError::configuration(format!("fallback.class: {e}")))?;
        if config.concurrency == 0 {
            return Err(AppError::configuration("fallback.concurrency must be at least 1"));
        }

        let runtime = Arc::new(Runtime {
            jobs,
            storage,
            pipeline,
            worker_id: config.worker_id.clone(),
            in_flight: Mutex::new(HashSet::new()),
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&runtime),
            receiver,
            cancel,
            config.concurrency,
            Duration::from_secs(config.shutdown_timeout_seconds),
        ));

        info!(
            worker_id = %config.worker_id,
            class = %class,
            concurrency = config.concurrency,
            "Fallback supervisor started"
        );

        Ok(Arc::new(Self {
            runtime,
            class,
            sender,
            dispatcher: Mutex::new(Some(dispatcher)),
        }))
    }

    /// Reserved identity recorded on escalated jobs.
    pub fn worker_id(&self) -> &str {
        &self.runtime.worker_id
    }

    /// Worker class the fallback runs as.
    pub fn class(&self) -> WorkerClass {
        self.class
    }

    /// Queue an already-claimed job for processing. Never waits.
    pub fn submit(&self, id: JobId) -> AppResult<()> {
        self.sender
            .send(id)
            .map_err(|_| AppError::internal("Fallback processor is not running"))
    }

    /// Ids of jobs currently being processed.
    pub fn in_flight(&self) -> Vec<JobId> {
        self.runtime.in_flight().iter().copied().collect()
    }

    /// Re-queue jobs a previous process left PROCESSING under the fallback
    /// identity. Returns how many were queued.
    pub async fn recover(&self) -> AppResult<usize> {
        let stranded = self
            .runtime
            .jobs
            .find_processing_by_worker(&self.runtime.worker_id)
            .await?;

        for job in &stranded {
            info!(job_id = %job.id, "Re-queueing stranded fallback job");
            self.submit(job.id)?;
        }
        Ok(stranded.len())
    }

    /// Wait for the dispatcher to finish after cancellation.
    pub async fn join(&self) {
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Fallback dispatcher panicked");
            }
        }
    }
}

async fn dispatch(
    runtime: Arc<Runtime>,
    mut receiver: mpsc::UnboundedReceiver<JobId>,
    mut cancel: watch::Receiver<bool>,
    concurrency: usize,
    shutdown_timeout: Duration,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency));

    loop {
        let id = tokio::select! {
            changed = cancel.changed() => {
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
                continue;
            }
            next = receiver.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let permit = tokio::select! {
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            // The job stays PROCESSING under our identity; recover() picks
            // it up on the next start.
            _ = cancel.changed() => break,
        };

        runtime.in_flight().insert(id);
        let guard = InFlightGuard {
            runtime: Arc::clone(&runtime),
            id,
        };
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            run(&runtime, id).await;
        });
    }

    info!("Fallback dispatcher waiting for in-flight jobs to complete...");
    match tokio::time::timeout(shutdown_timeout, semaphore.acquire_many(concurrency as u32)).await {
        Ok(_) => info!("Fallback dispatcher shut down complete"),
        Err(_) => warn!(
            in_flight = runtime.in_flight().len(),
            "Fallback shutdown timed out, jobs left to recovery"
        ),
    }
}

/// Process one job to a terminal state.
async fn run(runtime: &Runtime, id: JobId) {
    let job = match runtime.jobs.find_by_id(id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            info!(job_id = %id, "Fallback job was discarded before it started");
            return;
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "Failed to load fallback job");
            fail(runtime, id, None, &format!("fallback processing failed: {}", e.message)).await;
            return;
        }
    };

    if !job.is_held_by(&runtime.worker_id) {
        warn!(job_id = %id, status = %job.status, "Fallback job is not held by the fallback worker");
        return;
    }

    let input = if is_remote_source(&job.input_path) {
        job.input_path.clone()
    } else {
        match runtime.storage.exists(&job.input_path).await {
            Ok(true) => runtime
                .storage
                .local_path(&job.input_path)
                .to_string_lossy()
                .into_owned(),
            Ok(false) => {
                fail(runtime, id, Some(&job), "input artifact not found").await;
                return;
            }
            Err(e) => {
                error!(job_id = %id, error = %e, "Failed to check fallback input");
                let message = format!("fallback processing failed: {}", e.message);
                fail(runtime, id, None, &message).await;
                return;
            }
        }
    };

    let out_key = output_key(&id);
    let result = match runtime.storage.prepare(&out_key).await {
        Ok(out_path) => {
            info!(job_id = %id, pipeline = runtime.pipeline.name(), "Fallback processing started");
            runtime.pipeline.process(&input, &out_path).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            match runtime
                .jobs
                .update_status(id, &UpdateJobStatus::completed(out_key.clone()))
                .await
            {
                Ok(true) => {
                    info!(job_id = %id, "Fallback processing completed");
                    remove_input(runtime, &job).await;
                }
                Ok(false) => {
                    info!(job_id = %id, "Fallback job was discarded while processing");
                    remove_quietly(runtime, &out_key).await;
                    remove_input(runtime, &job).await;
                }
                Err(e) => {
                    error!(job_id = %id, error = %e, "Failed to record fallback completion");
                    fail(runtime, id, Some(&job), &format!("fallback processing failed: {}", e.message))
                        .await;
                }
            }
        }
        Err(e) => {
            warn!(job_id = %id, error = %e, "Fallback processing failed");
            fail(runtime, id, Some(&job), &format!("fallback processing failed: {}", e.message))
                .await;
        }
    }
}

/// Best-effort FAILED write plus artifact cleanup.
async fn fail(runtime: &Runtime, id: JobId, job: Option<&Job>, message: &str) {
    match runtime.jobs.update_status(id, &UpdateJobStatus::failed(message)).await {
        Ok(true) => info!(job_id = %id, message, "Fallback job marked failed"),
        Ok(false) => info!(job_id = %id, "Fallback job was discarded before failure was recorded"),
        Err(e) => error!(job_id = %id, error = %e, "Failed to mark fallback job as failed"),
    }

    remove_quietly(runtime, &output_key(&id)).await;
    if let Some(job) = job {
        remove_input(runtime, job).await;
    }
}

async fn remove_input(runtime: &Runtime, job: &Job) {
    if !is_remote_source(&job.input_path) {
        remove_quietly(runtime, &job.input_path).await;
    }
}

async fn remove_quietly(runtime: &Runtime, key: &str) {
    if let Err(e) = runtime.storage.remove(key).await {
        warn!(key, error = %e, "Failed to clean up artifact");
    }
}
