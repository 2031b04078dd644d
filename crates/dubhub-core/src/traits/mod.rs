//! Collaborator traits implemented outside `dubhub-core`.

pub mod pipeline;
pub mod storage;

pub use pipeline::MediaPipeline;
pub use storage::ArtifactStorage;
