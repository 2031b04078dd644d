//! IP admission record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Row of the `ip_requests` ledger.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IpAdmission {
    /// Client IP address (primary key).
    pub ip: String,
    /// Number of accepted-or-counted creation requests.
    pub request_count: i64,
    /// Sticky block flag.
    pub blocked: bool,
    /// Last time the record was touched.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Request count recorded for the IP after this check.
    pub total_count: i64,
}
