//! # dubhub-service
//!
//! Business logic for DubHub. Services orchestrate the job store, the
//! admission ledger, artifact storage and the media pipeline.
//!
//! Services follow constructor injection: all dependencies are provided
//! at construction time via `Arc` references.

pub mod admission;
pub mod fallback;
pub mod job;
pub mod lease;
pub mod pipeline;

pub use admission::AdmissionGate;
pub use fallback::FallbackSupervisor;
pub use job::JobService;
pub use lease::LeaseCoordinator;
pub use pipeline::CommandPipeline;

#[cfg(test)]
pub(crate) mod test_support;
