//! Custom Axum extractors.

pub mod client_ip;
pub mod path;

pub use client_ip::ClientIp;
pub use path::parse_job_id;
