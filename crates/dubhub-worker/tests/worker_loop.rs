//! Drives the worker against a live coordinator bound to a local port.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::TryStreamExt;
use tempfile::TempDir;
use tokio::sync::watch;

use dubhub_api::{AppState, build_router};
use dubhub_core::config::AppConfig;
use dubhub_core::config::worker::WorkerConfig;
use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::traits::MediaPipeline;
use dubhub_database::DatabasePool;
use dubhub_database::migration::run_migrations;
use dubhub_entity::job::{JobStatus, JobTarget};
use dubhub_worker::WorkerRunner;
use dubhub_worker::runner::PollOutcome;

const API_KEY: &str = "worker-test-key";

/// Uppercases the input file, or writes the URL it was given.
#[derive(Debug, Default)]
struct RecordingPipeline {
    fail_with: Option<String>,
    inputs: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaPipeline for RecordingPipeline {
    fn name(&self) -> &str {
        "recording"
    }

    async fn process(&self, input: &str, output: &Path) -> AppResult<()> {
        self.inputs.lock().expect("lock").push(input.to_string());
        if let Some(message) = &self.fail_with {
            return Err(AppError::pipeline(message.clone()));
        }
        let data = match tokio::fs::read(input).await {
            Ok(data) => data.to_ascii_uppercase(),
            Err(_) => input.as_bytes().to_vec(),
        };
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

struct Coordinator {
    state: AppState,
    addr: SocketAddr,
    _cancel: watch::Sender<bool>,
    _dir: TempDir,
}

async fn start_coordinator() -> Coordinator {
    start_coordinator_with(|router| router).await
}

async fn start_coordinator_with(wrap: impl FnOnce(Router) -> Router) -> Coordinator {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = AppConfig::default();
    config.database.url = format!("sqlite://{}", dir.path().join("jobs.db").display());
    config.storage.data_root = dir.path().join("artifacts").to_string_lossy().into_owned();
    config.fallback.enabled = false;
    config.worker.api_key = API_KEY.to_string();

    let db = DatabasePool::connect(&config.database).await.expect("connect");
    run_migrations(db.pool()).await.expect("migrate");

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let pipeline: Arc<dyn MediaPipeline> = Arc::new(RecordingPipeline::default());
    let state = AppState::build(config, db, pipeline, cancel_rx)
        .await
        .expect("state");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    let router = wrap(build_router(state.clone()));
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("serve");
    });

    Coordinator {
        state,
        addr,
        _cancel: cancel_tx,
        _dir: dir,
    }
}

fn worker_config(addr: SocketAddr, class: &str) -> WorkerConfig {
    WorkerConfig {
        api_key: API_KEY.to_string(),
        api_url: format!("http://{addr}"),
        worker_id: Some(format!("{class}-test")),
        class: class.to_string(),
        poll_interval_seconds: 1,
        request_timeout_seconds: 10,
    }
}

#[tokio::test]
async fn test_worker_processes_uploaded_job() {
    let coordinator = start_coordinator().await;
    let job = coordinator
        .state
        .jobs
        .create_from_upload("127.0.0.1", JobTarget::Pc, Bytes::from_static(b"video bytes"))
        .await
        .expect("create");

    let pipeline = Arc::new(RecordingPipeline::default());
    let runner = WorkerRunner::new(&worker_config(coordinator.addr, "pc"), pipeline.clone())
        .expect("runner");

    assert_eq!(runner.poll_once().await.expect("poll"), PollOutcome::Completed);

    let done = coordinator.state.jobs.status(job.id).await.expect("status");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.worker_id.as_deref(), Some("pc-test"));

    let (stream, size) = coordinator.state.jobs.open_result(job.id).await.expect("open");
    let chunks: Vec<Bytes> = stream.try_collect().await.expect("read");
    assert_eq!(chunks.concat(), b"VIDEO BYTES");
    assert_eq!(size, 11);

    // The pipeline saw a local file, not the storage key.
    let inputs = pipeline.inputs.lock().expect("lock");
    assert!(inputs[0].ends_with("_input.mp4"));
    assert!(!inputs[0].starts_with("inputs/"));
}

#[tokio::test]
async fn test_worker_passes_source_url_through() {
    let coordinator = start_coordinator().await;
    let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
    let job = coordinator
        .state
        .jobs
        .create_from_url("127.0.0.1", JobTarget::Cloud, url)
        .await
        .expect("create");

    let pipeline = Arc::new(RecordingPipeline::default());
    let runner = WorkerRunner::new(&worker_config(coordinator.addr, "cloud"), pipeline.clone())
        .expect("runner");

    assert_eq!(runner.poll_once().await.expect("poll"), PollOutcome::Completed);
    assert_eq!(pipeline.inputs.lock().expect("lock").as_slice(), [url.to_string()]);

    let done = coordinator.state.jobs.status(job.id).await.expect("status");
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_worker_reports_pipeline_failure() {
    let coordinator = start_coordinator().await;
    let job = coordinator
        .state
        .jobs
        .create_from_upload("127.0.0.1", JobTarget::Pc, Bytes::from_static(b"video"))
        .await
        .expect("create");

    let pipeline = Arc::new(RecordingPipeline {
        fail_with: Some("tts backend unavailable".into()),
        ..RecordingPipeline::default()
    });
    let runner =
        WorkerRunner::new(&worker_config(coordinator.addr, "pc"), pipeline).expect("runner");

    assert_eq!(runner.poll_once().await.expect("poll"), PollOutcome::Failed);

    let failed = coordinator.state.jobs.status(job.id).await.expect("status");
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(
        failed
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("tts backend unavailable"))
    );
}

#[tokio::test]
async fn test_failure_report_is_retried_after_server_error() {
    let reports = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&reports);
    let coordinator = start_coordinator_with(move |router| {
        router.layer(middleware::from_fn(move |request: Request<Body>, next: Next| {
            let seen = Arc::clone(&seen);
            async move {
                if request.uri().path().ends_with("/complete")
                    && seen.fetch_add(1, Ordering::SeqCst) == 0
                {
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
                next.run(request).await
            }
        }))
    })
    .await;
    let job = coordinator
        .state
        .jobs
        .create_from_upload("127.0.0.1", JobTarget::Pc, Bytes::from_static(b"video"))
        .await
        .expect("create");

    let pipeline = Arc::new(RecordingPipeline {
        fail_with: Some("asr crashed".into()),
        ..RecordingPipeline::default()
    });
    let runner =
        WorkerRunner::new(&worker_config(coordinator.addr, "pc"), pipeline).expect("runner");

    assert_eq!(runner.poll_once().await.expect("poll"), PollOutcome::Failed);
    assert_eq!(reports.load(Ordering::SeqCst), 2);

    let failed = coordinator.state.jobs.status(job.id).await.expect("status");
    assert_eq!(failed.status, JobStatus::Failed);
}

#[tokio::test]
async fn test_worker_ignores_other_class_and_idles() {
    let coordinator = start_coordinator().await;
    let job = coordinator
        .state
        .jobs
        .create_from_upload("127.0.0.1", JobTarget::Cloud, Bytes::from_static(b"video"))
        .await
        .expect("create");

    let runner = WorkerRunner::new(
        &worker_config(coordinator.addr, "pc"),
        Arc::new(RecordingPipeline::default()),
    )
    .expect("runner");

    assert_eq!(runner.poll_once().await.expect("poll"), PollOutcome::Idle);
    let pending = coordinator.state.jobs.status(job.id).await.expect("status");
    assert_eq!(pending.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_wrong_key_is_unauthorized() {
    let coordinator = start_coordinator().await;
    let mut config = worker_config(coordinator.addr, "pc");
    config.api_key = "wrong".into();

    let runner =
        WorkerRunner::new(&config, Arc::new(RecordingPipeline::default())).expect("runner");
    let err = runner.poll_once().await.expect_err("unauthorized");
    assert_eq!(err.kind, ErrorKind::Unauthorized);
}

#[tokio::test]
async fn test_run_stops_on_cancel() {
    let coordinator = start_coordinator().await;
    let runner = WorkerRunner::new(
        &worker_config(coordinator.addr, "pc"),
        Arc::new(RecordingPipeline::default()),
    )
    .expect("runner");

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move { runner.run(rx).await });
    tx.send(true).expect("send");
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .expect("runner stopped")
        .expect("join");
}

#[test]
fn test_invalid_class_is_configuration_error() {
    let config = WorkerConfig {
        class: "gpu".into(),
        ..WorkerConfig::default()
    };
    let err = WorkerRunner::new(&config, Arc::new(RecordingPipeline::default()))
        .expect_err("bad class");
    assert_eq!(err.kind, ErrorKind::Configuration);
}
