//! Artifact storage trait for job inputs and outputs.

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;
use crate::types::JobId;

/// A byte stream type used for reading artifact contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Storage key of a job's uploaded input.
pub fn input_key(id: &JobId) -> String {
    format!("inputs/{id}_input.mp4")
}

/// Storage key of a job's produced output.
pub fn output_key(id: &JobId) -> String {
    format!("outputs/{id}_output.mp4")
}

/// Whether a job input reference is a remote source URL rather than a
/// storage key.
pub fn is_remote_source(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Trait for artifact storage backends.
///
/// Keys are relative, slash-separated paths such as `inputs/<id>_input.mp4`.
/// The job table stores keys, never absolute paths.
#[async_trait]
pub trait ArtifactStorage: Send + Sync + std::fmt::Debug + 'static {
    /// Absolute local path for a key, for collaborators that need a real
    /// file (the media pipeline).
    fn local_path(&self, key: &str) -> PathBuf;

    /// Create missing parent directories of `key` and return its local path.
    async fn prepare(&self, key: &str) -> AppResult<PathBuf>;

    /// Write bytes under `key`, replacing any previous content.
    async fn save(&self, key: &str, data: Bytes) -> AppResult<u64>;

    /// Open `key` for streaming. Returns the stream and its size.
    async fn open(&self, key: &str) -> AppResult<(ByteStream, u64)>;

    /// Remove `key`. Returns `false` when nothing was there.
    async fn remove(&self, key: &str) -> AppResult<bool>;

    /// Whether `key` exists.
    async fn exists(&self, key: &str) -> AppResult<bool>;
}
