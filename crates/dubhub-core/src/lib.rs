//! # dubhub-core
//!
//! Core crate for DubHub. Contains the configuration schema, typed
//! identifiers, the collaborator traits (artifact storage, media pipeline),
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other DubHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
