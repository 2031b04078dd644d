//! # dubhub-worker
//!
//! The pull worker. It leases jobs from the coordinator over HTTP, runs the
//! media pipeline on them and uploads the result (or reports the failure).

pub mod client;
pub mod runner;

pub use client::{ApiClient, RemoteJob};
pub use runner::WorkerRunner;
