//! Per-IP admission gate for job creation.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use dubhub_core::config::admission::AdmissionConfig;
use dubhub_core::error::AppError;
use dubhub_core::result::AppResult;
use dubhub_database::repositories::AdmissionRepository;
use dubhub_entity::admission::AdmissionDecision;

/// Counts job-creation requests per client IP and blocks abusive IPs.
///
/// Blocks are permanent; the ledger lives in the database so they survive
/// restarts.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    repo: Arc<AdmissionRepository>,
    enabled: bool,
    max_allowed: i64,
    bypass: HashSet<String>,
}

impl AdmissionGate {
    /// Create a gate from configuration.
    pub fn new(repo: Arc<AdmissionRepository>, config: &AdmissionConfig) -> Self {
        Self {
            repo,
            enabled: config.enabled,
            max_allowed: config.max_requests_per_ip,
            bypass: config.bypass_ips.iter().cloned().collect(),
        }
    }

    /// Whether `ip` skips the gate.
    pub fn is_bypassed(&self, ip: &str) -> bool {
        !self.enabled || self.bypass.contains(ip)
    }

    /// Record one request from `ip` and return the decision.
    ///
    /// Bypassed IPs are always allowed and leave the ledger untouched
    /// (`total_count` is reported as 0).
    pub async fn register_request(&self, ip: &str) -> AppResult<AdmissionDecision> {
        if self.is_bypassed(ip) {
            return Ok(AdmissionDecision {
                allowed: true,
                total_count: 0,
            });
        }

        let decision = self.repo.register(ip, self.max_allowed).await?;
        if !decision.allowed {
            warn!(ip, total_count = decision.total_count, "Admission denied");
        } else if decision.total_count == self.max_allowed {
            info!(ip, total_count = decision.total_count, "IP reached its request allowance");
        }
        Ok(decision)
    }

    /// Like [`register_request`](Self::register_request) but turns a denial
    /// into [`ErrorKind::RateLimited`](dubhub_core::error::ErrorKind::RateLimited).
    pub async fn ensure_allowed(&self, ip: &str) -> AppResult<AdmissionDecision> {
        let decision = self.register_request(ip).await?;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(AppError::rate_limited(format!(
                "Request limit reached for this address ({} requests)",
                decision.total_count
            )))
        }
    }
}
