//! Repository implementations for DubHub entities.

pub mod admission;
pub mod job;

pub use admission::AdmissionRepository;
pub use job::JobRepository;
