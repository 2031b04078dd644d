//! HTTP client for the coordinator's worker endpoints.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use dubhub_core::config::worker::WorkerConfig;
use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::types::JobId;
use dubhub_entity::job::{JobTarget, WorkerClass};

const API_KEY_HEADER: &str = "X-API-Key";

/// A job leased to this worker.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJob {
    pub id: JobId,
    pub target: JobTarget,
    /// Storage key or source URL.
    pub input_path: String,
    /// Source URL, or the coordinator path serving the stored input.
    pub input_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct NextJob {
    job: Option<RemoteJob>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Thin wrapper around `reqwest` that speaks the coordinator's JSON API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl ApiClient {
    /// Build a client from the worker configuration.
    pub fn new(config: &WorkerConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.api_url).map_err(|e| {
            AppError::with_source(
                ErrorKind::Configuration,
                format!("Invalid coordinator URL: {}", config.api_url),
                e,
            )
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| {
                AppError::with_source(ErrorKind::Configuration, "Failed to build HTTP client", e)
            })?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> AppResult<Url> {
        self.base_url.join(path).map_err(|e| {
            AppError::with_source(ErrorKind::Internal, format!("Invalid request path: {path}"), e)
        })
    }

    /// Lease the next job for `worker_id`. `None` when the queue is empty.
    pub async fn next_job(
        &self,
        worker_id: &str,
        class: WorkerClass,
    ) -> AppResult<Option<RemoteJob>> {
        let response = self
            .http
            .get(self.url("/api/jobs/next")?)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("worker_id", worker_id), ("class", class.as_str())])
            .send()
            .await
            .map_err(request_error)?;

        let next: NextJob = parse_json(response).await?;
        Ok(next.job)
    }

    /// Stream the stored input of `job` into `dest`. Returns bytes written.
    pub async fn download_input(&self, job: &RemoteJob, dest: &Path) -> AppResult<u64> {
        let response = self
            .http
            .get(self.url(&job.input_url)?)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(request_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(job_id = %job.id, bytes = written, "Input downloaded");
        Ok(written)
    }

    /// Upload the produced artifact, completing the job.
    pub async fn upload_result(&self, id: JobId, worker_id: &str, path: &Path) -> AppResult<()> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();

        let response = self
            .http
            .post(self.url(&format!("/api/jobs/{id}/result"))?)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "video/mp4")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .query(&[("worker_id", worker_id)])
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(request_error)?;

        check_status(response).await?;
        Ok(())
    }

    /// Report that processing failed.
    pub async fn report_failure(&self, id: JobId, worker_id: &str, message: &str) -> AppResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/jobs/{id}/complete"))?)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&serde_json::json!({
                "worker_id": worker_id,
                "success": false,
                "error_message": message,
            }))
            .send()
            .await
            .map_err(request_error)?;

        check_status(response).await?;
        Ok(())
    }
}

fn request_error(err: reqwest::Error) -> AppError {
    AppError::with_source(
        ErrorKind::Internal,
        format!("Coordinator request failed: {err}"),
        err,
    )
}

/// Turn a non-2xx response into an `AppError` of the matching kind.
async fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.message,
        Err(_) => format!("Coordinator answered {status}"),
    };

    let kind = match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::CONFLICT => ErrorKind::Conflict,
        StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
        StatusCode::BAD_REQUEST => ErrorKind::Validation,
        StatusCode::PAYLOAD_TOO_LARGE => ErrorKind::PayloadTooLarge,
        _ => ErrorKind::Internal,
    };
    Err(AppError::new(kind, message))
}

async fn parse_json<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    let response = check_status(response).await?;
    let envelope: Envelope<T> = response.json().await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Serialization,
            format!("Unexpected coordinator response: {e}"),
            e,
        )
    })?;
    Ok(envelope.data)
}
