//! # dubhub-entity
//!
//! Domain entity models for DubHub. Every struct in this crate represents a
//! database table row or a domain value object. Database entities derive
//! `sqlx::FromRow`; enums are stored as lowercase text.

pub mod admission;
pub mod job;
