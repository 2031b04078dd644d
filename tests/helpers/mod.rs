//! Shared test helpers for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use bytes::Bytes;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::watch;
use tower::ServiceExt;

use dubhub_api::{AppState, build_router};
use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_core::result::AppResult;
use dubhub_core::traits::MediaPipeline;
use dubhub_database::DatabasePool;
use dubhub_database::migration::run_migrations;

/// Worker key used by every test app.
pub const WORKER_KEY: &str = "integration-key";

/// Pipeline that reverses the input bytes, or fails when told to.
#[derive(Debug, Default)]
pub struct StubPipeline {
    pub fail_with: Option<String>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl StubPipeline {
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
impl MediaPipeline for StubPipeline {
    fn name(&self) -> &str {
        "stub"
    }

    async fn process(&self, input: &str, output: &Path) -> AppResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(AppError::pipeline(message.clone()));
        }
        let mut data = tokio::fs::read(input)
            .await
            .unwrap_or_else(|_| input.as_bytes().to_vec());
        data.reverse();
        tokio::fs::write(output, data).await?;
        Ok(())
    }
}

/// Response captured by the test client.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub bytes: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON (`Null` when it is not JSON).
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.bytes).unwrap_or(Value::Null)
    }

    /// `data` member of the success envelope.
    pub fn data(&self) -> Value {
        self.json()["data"].clone()
    }
}

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// Shared state, for direct service access
    pub state: AppState,
    /// Pipeline used by the fallback
    pub pipeline: Arc<StubPipeline>,
    cancel: watch::Sender<bool>,
    _dir: TempDir,
}

impl TestApp {
    /// Create a test application with default settings
    pub async fn new() -> Self {
        Self::with(StubPipeline::default(), |_| {}).await
    }

    /// Create a test application with a custom pipeline and config tweaks
    pub async fn with(pipeline: StubPipeline, configure: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        config.storage.data_root = dir.path().join("artifacts").to_string_lossy().into_owned();
        config.worker.api_key = WORKER_KEY.to_string();
        // Requests arrive from a loopback proxy and pick their client
        // address through X-Forwarded-For.
        config.admission.bypass_ips = vec!["127.0.0.1".to_string()];
        configure(&mut config);

        let db = DatabasePool::connect(&config.database)
            .await
            .expect("Failed to connect to test database");
        run_migrations(db.pool())
            .await
            .expect("Failed to run migrations");

        let pipeline = Arc::new(pipeline);
        let (cancel, cancel_rx) = watch::channel(false);
        let state = AppState::build(config, db, pipeline.clone(), cancel_rx)
            .await
            .expect("Failed to build state");

        Self {
            router: build_router(state.clone()),
            state,
            pipeline,
            cancel,
            _dir: dir,
        }
    }

    /// Stop the fallback supervisor and wait for it.
    pub async fn shutdown(&self) {
        let _ = self.cancel.send(true);
        if let Some(fallback) = &self.state.fallback {
            fallback.join().await;
        }
    }

    /// Send a request through the router from a loopback proxy
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let proxy: SocketAddr = "127.0.0.1:40000".parse().expect("proxy addr");
        self.send_from(request, proxy).await
    }

    /// Send a request through the router as if it came from `peer`
    pub async fn send_from(&self, mut request: Request<Body>, peer: SocketAddr) -> TestResponse {
        request.extensions_mut().insert(ConnectInfo(peer));
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        TestResponse {
            status,
            headers,
            bytes,
        }
    }

    /// JSON request from a client address
    pub async fn client_json(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        ip: &str,
    ) -> TestResponse {
        let body = body
            .map(|b| serde_json::to_vec(&b).expect("Failed to serialize body"))
            .unwrap_or_default();
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Upload a video as a client
    pub async fn upload(&self, target: &str, data: &'static [u8], ip: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/jobs/upload?target={target}"))
            .header("content-type", "video/mp4")
            .header("x-forwarded-for", ip)
            .body(Body::from(data))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Upload and return the new job id
    pub async fn create_job(&self, target: &str, data: &'static [u8]) -> String {
        let response = self.upload(target, data, "198.51.100.10").await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.json());
        response.data()["job_id"]
            .as_str()
            .expect("job_id")
            .to_string()
    }

    /// Request with the worker key
    pub async fn worker(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let body = body
            .map(|b| serde_json::to_vec(&b).expect("Failed to serialize body"))
            .unwrap_or_default();
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .header("x-api-key", WORKER_KEY)
            .body(Body::from(body))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Raw-body request with the worker key
    pub async fn worker_bytes(&self, path: &str, data: &'static [u8]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "video/mp4")
            .header("x-api-key", WORKER_KEY)
            .body(Body::from(data))
            .expect("Failed to build request");
        self.send(request).await
    }

    /// Current status string of a job
    pub async fn status_of(&self, id: &str) -> String {
        let response = self
            .client_json("GET", &format!("/api/jobs/{id}"), None, "198.51.100.99")
            .await;
        response.data()["status"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }

    /// Poll until the job reaches COMPLETED or FAILED
    pub async fn wait_terminal(&self, id: &str) -> String {
        for _ in 0..200 {
            let status = self.status_of(id).await;
            if status == "completed" || status == "failed" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {id} never reached a terminal status");
    }
}
