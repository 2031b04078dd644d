//! Media job domain entities.

pub mod model;
pub mod status;
pub mod target;

pub use model::{CreateJob, FallbackOutcome, Job, JobOutcome, UpdateJobStatus};
pub use status::JobStatus;
pub use target::{JobTarget, WorkerClass};
