//! Per-IP admission ledger entities.

pub mod model;

pub use model::{AdmissionDecision, IpAdmission};
