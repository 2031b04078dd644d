//! Job lifecycle: create, query, report, discard and escalate.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};
use url::Url;

use dubhub_core::error::AppError;
use dubhub_core::result::AppResult;
use dubhub_core::traits::ArtifactStorage;
use dubhub_core::traits::storage::{ByteStream, input_key, is_remote_source, output_key};
use dubhub_core::types::JobId;
use dubhub_database::repositories::JobRepository;
use dubhub_entity::job::{
    CreateJob, FallbackOutcome, Job, JobOutcome, JobStatus, JobTarget, UpdateJobStatus,
};

use crate::admission::AdmissionGate;
use crate::fallback::FallbackSupervisor;

/// Hosts accepted for URL-sourced jobs.
const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "youtu.be",
    "www.youtu.be",
];

/// Validate a source URL and return its normalized form.
pub fn validate_source_url(raw: &str) -> AppResult<String> {
    let url = Url::parse(raw.trim())
        .map_err(|_| AppError::validation("source_url must be a valid URL"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::validation("source_url must use http or https"));
    }

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return Err(AppError::validation(
            "Only YouTube URLs are supported for URL jobs",
        ));
    }

    Ok(url.to_string())
}

/// Reject targets clients may not pick.
fn ensure_client_target(target: JobTarget) -> AppResult<()> {
    if target.is_client_selectable() {
        Ok(())
    } else {
        Err(AppError::validation("target must be 'cloud' or 'pc'"))
    }
}

/// Orchestrates the job store, admission gate, artifact storage and the
/// fallback supervisor.
#[derive(Debug, Clone)]
pub struct JobService {
    jobs: Arc<JobRepository>,
    admission: Arc<AdmissionGate>,
    storage: Arc<dyn ArtifactStorage>,
    fallback: Option<Arc<FallbackSupervisor>>,
    max_upload_bytes: u64,
}

impl JobService {
    /// Creates a new job service. Escalation is refused when `fallback` is
    /// `None`.
    pub fn new(
        jobs: Arc<JobRepository>,
        admission: Arc<AdmissionGate>,
        storage: Arc<dyn ArtifactStorage>,
        fallback: Option<Arc<FallbackSupervisor>>,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            jobs,
            admission,
            storage,
            fallback,
            max_upload_bytes,
        }
    }

    /// Create a job from an uploaded video.
    ///
    /// The upload is stored under the new job's id before the row is
    /// inserted; a failed insert removes it again.
    pub async fn create_from_upload(
        &self,
        client_ip: &str,
        target: JobTarget,
        data: Bytes,
    ) -> AppResult<Job> {
        self.admission.ensure_allowed(client_ip).await?;
        ensure_client_target(target)?;

        if data.is_empty() {
            return Err(AppError::validation("Uploaded file is empty"));
        }
        if data.len() as u64 > self.max_upload_bytes {
            return Err(AppError::payload_too_large(format!(
                "Uploaded file exceeds the {} byte limit",
                self.max_upload_bytes
            )));
        }

        let id = JobId::new();
        let key = input_key(&id);
        let size = self.storage.save(&key, data).await?;

        let created = self
            .jobs
            .create(&CreateJob {
                id,
                input_path: key.clone(),
                target,
            })
            .await;

        match created {
            Ok(job) => {
                info!(job_id = %job.id, target = %target, size, client_ip, "Job created from upload");
                Ok(job)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.remove(&key).await {
                    warn!(key, error = %cleanup, "Failed to remove orphaned upload");
                }
                Err(e)
            }
        }
    }

    /// Create a job whose input is a remote source URL.
    pub async fn create_from_url(
        &self,
        client_ip: &str,
        target: JobTarget,
        source_url: &str,
    ) -> AppResult<Job> {
        self.admission.ensure_allowed(client_ip).await?;
        ensure_client_target(target)?;
        let source_url = validate_source_url(source_url)?;

        let job = self
            .jobs
            .create(&CreateJob {
                id: JobId::new(),
                input_path: source_url,
                target,
            })
            .await?;

        info!(job_id = %job.id, target = %target, client_ip, "Job created from URL");
        Ok(job)
    }

    /// Current state of a job.
    pub async fn status(&self, id: JobId) -> AppResult<Job> {
        self.jobs
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))
    }

    /// Record the lease holder's result.
    ///
    /// Rejected without mutation when the job is missing (NotFound) or is
    /// not PROCESSING under `claimant` (Conflict).
    pub async fn report_result(
        &self,
        id: JobId,
        claimant: &str,
        success: bool,
        output_ref: Option<String>,
        error: Option<String>,
    ) -> AppResult<Job> {
        let outcome = if success {
            let output_path = output_ref
                .filter(|o| !o.trim().is_empty())
                .ok_or_else(|| AppError::validation("A successful result needs an output reference"))?;
            JobOutcome::Completed { output_path }
        } else {
            JobOutcome::Failed {
                error_message: error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "worker reported failure".to_string()),
            }
        };

        if !self.jobs.finish(id, claimant, &outcome).await? {
            let job = self.status(id).await?;
            return Err(AppError::conflict(format!(
                "Job {id} is {} and not held by worker '{claimant}'",
                job.status
            )));
        }

        info!(job_id = %id, claimant, status = %outcome.status(), "Job result recorded");
        self.status(id).await
    }

    /// Store a worker's output artifact and report success.
    ///
    /// The stored file is removed again when the report is rejected.
    pub async fn upload_result(&self, id: JobId, claimant: &str, data: Bytes) -> AppResult<Job> {
        if data.is_empty() {
            return Err(AppError::validation("Uploaded result is empty"));
        }

        let job = self.status(id).await?;
        if !job.is_held_by(claimant) {
            return Err(AppError::conflict(format!(
                "Job {id} is {} and not held by worker '{claimant}'",
                job.status
            )));
        }

        let key = output_key(&id);
        self.storage.save(&key, data).await?;

        match self.report_result(id, claimant, true, Some(key.clone()), None).await {
            Ok(job) => {
                if let Err(e) = self.remove_input(&job).await {
                    warn!(job_id = %id, error = %e, "Failed to remove input after completion");
                }
                Ok(job)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.remove(&key).await {
                    warn!(key, error = %cleanup, "Failed to remove rejected result");
                }
                Err(e)
            }
        }
    }

    /// Stream the output of a COMPLETED job.
    pub async fn open_result(&self, id: JobId) -> AppResult<(ByteStream, u64)> {
        let job = self.status(id).await?;
        if job.status != JobStatus::Completed {
            return Err(AppError::validation(format!(
                "Job {id} is not completed (status: {})",
                job.status
            )));
        }
        let output = job
            .output_path
            .ok_or_else(|| AppError::internal(format!("Completed job {id} has no output")))?;
        self.storage.open(&output).await
    }

    /// Stream the stored input of a job to the worker processing it.
    pub async fn open_input(&self, id: JobId) -> AppResult<(ByteStream, u64)> {
        let job = self.status(id).await?;
        if is_remote_source(&job.input_path) {
            return Err(AppError::validation(format!(
                "Job {id} has a remote source; fetch it from the URL"
            )));
        }
        self.storage.open(&job.input_path).await
    }

    /// Delete a job and its artifacts at any status. Unknown ids are a
    /// no-op; returns whether a job was removed.
    pub async fn discard(&self, id: JobId) -> AppResult<bool> {
        let Some(job) = self.jobs.find_by_id(id).await? else {
            return Ok(false);
        };

        let removed = self.jobs.delete(id).await?;

        let mut keys = vec![output_key(&id)];
        if let Some(output) = &job.output_path {
            if !is_remote_source(output) && !keys.contains(output) {
                keys.push(output.clone());
            }
        }
        if !is_remote_source(&job.input_path) {
            keys.push(job.input_path.clone());
        }
        for key in keys {
            if let Err(e) = self.storage.remove(&key).await {
                warn!(job_id = %id, key, error = %e, "Failed to remove artifact of discarded job");
            }
        }

        if removed {
            info!(job_id = %id, status = %job.status, "Job discarded");
        }
        Ok(removed)
    }

    /// Ask the coordinator to process a job itself.
    pub async fn escalate_fallback(&self, id: JobId) -> AppResult<FallbackOutcome> {
        let job = self.status(id).await?;

        match job.status {
            JobStatus::Completed => return Ok(FallbackOutcome::AlreadyCompleted),
            JobStatus::Failed => return Ok(FallbackOutcome::Rejected),
            JobStatus::Processing => return Ok(FallbackOutcome::AlreadyProcessing),
            JobStatus::Pending => {}
        }

        let Some(fallback) = &self.fallback else {
            warn!(job_id = %id, "Fallback escalation requested but fallback is disabled");
            return Ok(FallbackOutcome::Rejected);
        };

        if !fallback.class().can_run(job.target) {
            info!(job_id = %id, target = %job.target, class = %fallback.class(), "Fallback rejected for target");
            return Ok(FallbackOutcome::Rejected);
        }

        // Claim and handoff run in their own task: a dropped request must not
        // leave a claimed job that was never queued.
        let jobs = Arc::clone(&self.jobs);
        let fallback = Arc::clone(fallback);
        let handoff = tokio::spawn(async move {
            if !jobs.claim_by_id(id, fallback.worker_id()).await? {
                return Ok(FallbackOutcome::AlreadyProcessing);
            }

            if let Err(e) = fallback.submit(id) {
                warn!(job_id = %id, error = %e, "Failed to hand job to fallback processor");
                let message = format!("fallback processing failed: {}", e.message);
                jobs.update_status(id, &UpdateJobStatus::failed(message)).await?;
                return Err(e);
            }

            info!(job_id = %id, worker_id = fallback.worker_id(), "Job escalated to fallback");
            Ok(FallbackOutcome::Started)
        });

        handoff
            .await
            .map_err(|e| AppError::internal(format!("Fallback handoff task failed: {e}")))?
    }

    /// Jobs the fallback is running right now.
    pub fn fallback_in_flight(&self) -> Vec<JobId> {
        self.fallback
            .as_ref()
            .map(|f| f.in_flight())
            .unwrap_or_default()
    }

    async fn remove_input(&self, job: &Job) -> AppResult<()> {
        if !is_remote_source(&job.input_path) {
            self.storage.remove(&job.input_path).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dubhub_core::config::admission::AdmissionConfig;
    use dubhub_core::config::fallback::FallbackConfig;
    use dubhub_core::config::lease::LeaseConfig;
    use dubhub_core::error::ErrorKind;
    use dubhub_entity::job::WorkerClass;
    use futures::TryStreamExt;
    use tokio::sync::watch;

    use super::*;
    use crate::lease::LeaseCoordinator;
    use crate::test_support::{FakePipeline, TestContext, assert_status};

    struct Harness {
        ctx: TestContext,
        service: JobService,
        lease: LeaseCoordinator,
        pipeline: Arc<FakePipeline>,
        _cancel: watch::Sender<bool>,
    }

    async fn harness_with(pipeline: FakePipeline, max_requests: i64) -> Harness {
        let ctx = TestContext::new().await;
        let pipeline = Arc::new(pipeline);
        let (cancel, rx) = watch::channel(false);
        let fallback = FallbackSupervisor::start(
            ctx.job_repo.clone(),
            ctx.storage_dyn(),
            pipeline.clone(),
            &FallbackConfig::default(),
            rx,
        )
        .expect("fallback");
        let gate = AdmissionGate::new(ctx.admission_repo.clone(), &AdmissionConfig {
            max_requests_per_ip: max_requests,
            ..AdmissionConfig::default()
        });
        let service = JobService::new(
            ctx.job_repo.clone(),
            Arc::new(gate),
            ctx.storage_dyn(),
            Some(fallback),
            1024,
        );
        let lease = LeaseCoordinator::new(ctx.job_repo.clone(), LeaseConfig::default());
        Harness {
            ctx,
            service,
            lease,
            pipeline,
            _cancel: cancel,
        }
    }

    async fn harness() -> Harness {
        harness_with(FakePipeline::default(), 13).await
    }

    const CLIENT: &str = "203.0.113.10";

    #[tokio::test]
    async fn test_cloud_job_full_lifecycle() {
        let h = harness().await;
        let job = h
            .service
            .create_from_upload(CLIENT, JobTarget::Cloud, Bytes::from_static(b"video"))
            .await
            .expect("create");
        assert_status(&job, JobStatus::Pending);
        assert!(h.ctx.storage.exists(&job.input_path).await.expect("exists"));

        assert!(h.lease.claim_next("pc-1", Some(WorkerClass::Pc)).await.expect("poll").is_none());
        let leased = h
            .lease
            .claim_next("cloud-1", Some(WorkerClass::Cloud))
            .await
            .expect("poll")
            .expect("job");
        assert_eq!(leased.id, job.id);

        let done = h
            .service
            .report_result(job.id, "cloud-1", true, Some("X".into()), None)
            .await
            .expect("report");
        assert_status(&done, JobStatus::Completed);
        assert_eq!(done.output_path.as_deref(), Some("X"));
    }

    #[tokio::test]
    async fn test_report_rejections_do_not_mutate() {
        let h = harness().await;
        let job = h
            .service
            .create_from_url(CLIENT, JobTarget::Pc, "https://youtu.be/dQw4w9WgXcQ")
            .await
            .expect("create");

        let err = h
            .service
            .report_result(job.id, "pc-1", false, None, Some("boom".into()))
            .await
            .expect_err("not processing");
        assert_eq!(err.kind, ErrorKind::Conflict);

        h.lease.claim_next("pc-1", Some(WorkerClass::Pc)).await.expect("poll").expect("job");
        let err = h
            .service
            .report_result(job.id, "pc-2", true, Some("Y".into()), None)
            .await
            .expect_err("wrong claimant");
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = h
            .service
            .report_result(job.id, "pc-1", true, None, None)
            .await
            .expect_err("no output");
        assert_eq!(err.kind, ErrorKind::Validation);

        let stored = h.service.status(job.id).await.expect("status");
        assert_status(&stored, JobStatus::Processing);

        let failed = h
            .service
            .report_result(job.id, "pc-1", false, None, None)
            .await
            .expect("report failure");
        assert_eq!(failed.error_message.as_deref(), Some("worker reported failure"));
    }

    #[tokio::test]
    async fn test_report_after_discard_is_not_found() {
        let h = harness().await;
        let job = h
            .service
            .create_from_upload(CLIENT, JobTarget::Pc, Bytes::from_static(b"video"))
            .await
            .expect("create");
        h.lease.claim_next("pc-1", Some(WorkerClass::Pc)).await.expect("poll").expect("job");

        assert!(h.service.discard(job.id).await.expect("discard"));
        assert!(!h.ctx.storage.exists(&job.input_path).await.expect("exists"));
        assert!(!h.service.discard(job.id).await.expect("discard again"));

        let err = h
            .service
            .report_result(job.id, "pc-1", true, Some("Z".into()), None)
            .await
            .expect_err("discarded");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(h.ctx.job_repo.find_by_id(job.id).await.expect("find").is_none());

        assert!(!h.service.discard(JobId::new()).await.expect("unknown id"));
    }

    #[tokio::test]
    async fn test_upload_validation() {
        let h = harness().await;
        let err = h
            .service
            .create_from_upload(CLIENT, JobTarget::Cloud, Bytes::new())
            .await
            .expect_err("empty");
        assert_eq!(err.kind, ErrorKind::Validation);

        let err = h
            .service
            .create_from_upload(CLIENT, JobTarget::Cloud, Bytes::from(vec![0u8; 2048]))
            .await
            .expect_err("too large");
        assert_eq!(err.kind, ErrorKind::PayloadTooLarge);

        let err = h
            .service
            .create_from_upload(CLIENT, JobTarget::Any, Bytes::from_static(b"v"))
            .await
            .expect_err("any target");
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_source_url_validation() {
        assert!(validate_source_url("https://www.youtube.com/watch?v=abc").is_ok());
        assert!(validate_source_url("http://m.youtube.com/watch?v=abc").is_ok());
        assert!(validate_source_url("https://youtu.be/abc").is_ok());
        assert!(validate_source_url("ftp://youtube.com/abc").is_err());
        assert!(validate_source_url("https://vimeo.com/123").is_err());
        assert!(validate_source_url("https://youtube.com.evil.io/x").is_err());
        assert!(validate_source_url("not a url").is_err());
    }

    #[tokio::test]
    async fn test_admission_blocks_creation() {
        let h = harness_with(FakePipeline::default(), 1).await;
        h.service
            .create_from_url(CLIENT, JobTarget::Pc, "https://youtu.be/a")
            .await
            .expect("first");
        let err = h
            .service
            .create_from_url(CLIENT, JobTarget::Pc, "https://youtu.be/b")
            .await
            .expect_err("second");
        assert_eq!(err.kind, ErrorKind::RateLimited);

        // Loopback bypasses the gate.
        h.service
            .create_from_url("127.0.0.1", JobTarget::Pc, "https://youtu.be/c")
            .await
            .expect("bypass");
    }

    #[tokio::test]
    async fn test_upload_result_completes_and_streams() {
        let h = harness().await;
        let job = h
            .service
            .create_from_upload(CLIENT, JobTarget::Pc, Bytes::from_static(b"video"))
            .await
            .expect("create");
        h.lease.claim_next("pc-1", Some(WorkerClass::Pc)).await.expect("poll").expect("job");

        let err = h
            .service
            .upload_result(job.id, "pc-2", Bytes::from_static(b"dubbed"))
            .await
            .expect_err("wrong worker");
        assert_eq!(err.kind, ErrorKind::Conflict);

        let err = h.service.open_result(job.id).await.err().expect("not completed");
        assert_eq!(err.kind, ErrorKind::Validation);

        let done = h
            .service
            .upload_result(job.id, "pc-1", Bytes::from_static(b"dubbed"))
            .await
            .expect("upload");
        assert_status(&done, JobStatus::Completed);
        assert_eq!(done.output_path, Some(output_key(&job.id)));

        let (stream, size) = h.service.open_result(job.id).await.expect("open");
        assert_eq!(size, 6);
        let chunks: Vec<Bytes> = stream.try_collect().await.expect("read");
        assert_eq!(chunks.concat(), b"dubbed");
    }

    #[tokio::test]
    async fn test_escalation_outcomes() {
        let h = harness().await;

        let cloud = h
            .service
            .create_from_upload(CLIENT, JobTarget::Cloud, Bytes::from_static(b"video"))
            .await
            .expect("create");
        assert_eq!(
            h.service.escalate_fallback(cloud.id).await.expect("escalate"),
            FallbackOutcome::Started
        );
        let done = h.ctx.wait_terminal(cloud.id).await.expect("exists");
        assert_status(&done, JobStatus::Completed);
        assert_eq!(h.pipeline.calls(), 1);

        // Completed jobs are left alone.
        assert_eq!(
            h.service.escalate_fallback(cloud.id).await.expect("escalate"),
            FallbackOutcome::AlreadyCompleted
        );
        let unchanged = h.service.status(cloud.id).await.expect("status");
        assert_eq!(unchanged.updated_at, done.updated_at);

        // The fallback runs as a cloud worker.
        let pc = h
            .service
            .create_from_url(CLIENT, JobTarget::Pc, "https://youtu.be/pc")
            .await
            .expect("create");
        assert_eq!(
            h.service.escalate_fallback(pc.id).await.expect("escalate"),
            FallbackOutcome::Rejected
        );

        h.lease.claim_next("pc-1", Some(WorkerClass::Pc)).await.expect("poll").expect("job");
        assert_eq!(
            h.service.escalate_fallback(pc.id).await.expect("escalate"),
            FallbackOutcome::AlreadyProcessing
        );

        h.service
            .report_result(pc.id, "pc-1", false, None, Some("bad audio".into()))
            .await
            .expect("fail");
        assert_eq!(
            h.service.escalate_fallback(pc.id).await.expect("escalate"),
            FallbackOutcome::Rejected
        );

        let err = h.service.escalate_fallback(JobId::new()).await.expect_err("missing");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_escalation_failure_records_failed() {
        let h = harness_with(FakePipeline::failing("whisper died"), 13).await;
        let job = h
            .service
            .create_from_url(CLIENT, JobTarget::Cloud, "https://youtu.be/x")
            .await
            .expect("create");

        assert_eq!(
            h.service.escalate_fallback(job.id).await.expect("escalate"),
            FallbackOutcome::Started
        );
        let done = h.ctx.wait_terminal(job.id).await.expect("exists");
        assert_status(&done, JobStatus::Failed);
        assert!(done.error_message.expect("message").contains("whisper died"));
    }

    #[tokio::test]
    async fn test_escalation_returns_while_fallback_is_busy() {
        let h = harness_with(
            FakePipeline {
                delay: Some(std::time::Duration::from_millis(200)),
                ..FakePipeline::default()
            },
            13,
        )
        .await;

        let mut ids = Vec::new();
        for _ in 0..4 {
            let job = h
                .service
                .create_from_url(CLIENT, JobTarget::Cloud, "https://youtu.be/busy")
                .await
                .expect("create");
            let outcome = tokio::time::timeout(
                std::time::Duration::from_millis(100),
                h.service.escalate_fallback(job.id),
            )
            .await
            .expect("escalation must not wait for running jobs")
            .expect("escalate");
            assert_eq!(outcome, FallbackOutcome::Started);
            ids.push(job.id);
        }

        for id in ids {
            let done = h.ctx.wait_terminal(id).await.expect("exists");
            assert_status(&done, JobStatus::Completed);
        }
        assert_eq!(h.pipeline.calls(), 4);
    }

    #[tokio::test]
    async fn test_dropped_escalation_never_strands_job() {
        let h = harness_with(
            FakePipeline {
                delay: Some(std::time::Duration::from_millis(50)),
                ..FakePipeline::default()
            },
            13,
        )
        .await;
        let service = Arc::new(h.service.clone());

        let mut ids = Vec::new();
        for yields in 0..6 {
            let job = service
                .create_from_url(CLIENT, JobTarget::Cloud, "https://youtu.be/drop")
                .await
                .expect("create");
            let task = tokio::spawn({
                let service = Arc::clone(&service);
                async move { service.escalate_fallback(job.id).await }
            });
            for _ in 0..yields {
                tokio::task::yield_now().await;
            }
            task.abort();
            ids.push(job.id);
        }

        // Each job either was never claimed or runs to completion.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        for id in ids {
            let job = h.ctx.job_repo.find_by_id(id).await.expect("find").expect("exists");
            if job.status == JobStatus::Pending {
                continue;
            }
            let done = h.ctx.wait_terminal(id).await.expect("exists");
            assert_status(&done, JobStatus::Completed);
        }
    }
}
