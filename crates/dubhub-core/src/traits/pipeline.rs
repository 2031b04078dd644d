//! The opaque media processing collaborator.

use std::path::Path;

use async_trait::async_trait;

use crate::result::AppResult;

/// Turns one input video into one dubbed output video.
///
/// `input` is either a local file path or a source URL; the pipeline decides
/// how to fetch it. On success a file exists at `output`. Any error is
/// reported as [`ErrorKind::Pipeline`](crate::error::ErrorKind::Pipeline)
/// and carries a message suitable for the job's `error_message`.
#[async_trait]
pub trait MediaPipeline: Send + Sync + std::fmt::Debug + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Run the pipeline to completion.
    async fn process(&self, input: &str, output: &Path) -> AppResult<()>;
}
