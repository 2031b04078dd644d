//! # dubhub-storage
//!
//! Artifact storage for job inputs and outputs. Only the local filesystem
//! backend exists; the coordinator and the in-process fallback share it.

pub mod local;

pub use local::LocalArtifactStorage;
