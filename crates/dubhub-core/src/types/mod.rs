//! Core type definitions used across the DubHub workspace.

pub mod id;

pub use id::JobId;
