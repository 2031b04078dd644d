//! # dubhub-api
//!
//! HTTP API layer for DubHub built on Axum.
//!
//! Provides the client and worker endpoints, middleware (worker key,
//! request logging, CORS), extractors, DTOs, and error mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
