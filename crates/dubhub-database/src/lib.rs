//! # dubhub-database
//!
//! SQLite connection management, embedded migrations and the repositories
//! backing the job store and the admission ledger.

pub mod connection;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
