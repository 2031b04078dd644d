//! In-process fallback processing configuration.

use serde::{Deserialize, Serialize};

/// Settings for the coordinator's own fallback worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Whether escalation is accepted.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Reserved identity recorded as `worker_id` on escalated jobs.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,
    /// Worker class the coordinator process belongs to.
    #[serde(default = "default_class")]
    pub class: String,
    /// Maximum fallback jobs running at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Seconds to wait for in-flight jobs on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_id: default_worker_id(),
            class: default_class(),
            concurrency: default_concurrency(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_worker_id() -> String {
    "render-fallback".to_string()
}

fn default_class() -> String {
    "cloud".to_string()
}

fn default_concurrency() -> usize {
    1
}

fn default_shutdown_timeout() -> u64 {
    30
}
