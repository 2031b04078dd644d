//! Admission gate configuration.

use serde::{Deserialize, Serialize};

/// Per-IP job creation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Whether the gate is enforced at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Accepted creation requests per IP before the IP is blocked.
    #[serde(default = "default_max_requests")]
    pub max_requests_per_ip: i64,
    /// Addresses that skip the gate entirely.
    #[serde(default = "default_bypass_ips")]
    pub bypass_ips: Vec<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_ip: default_max_requests(),
            bypass_ips: default_bypass_ips(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> i64 {
    13
}

fn default_bypass_ips() -> Vec<String> {
    vec!["127.0.0.1".to_string(), "::1".to_string()]
}
