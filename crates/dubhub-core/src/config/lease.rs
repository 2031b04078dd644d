//! Lease routing configuration.

use serde::{Deserialize, Serialize};

/// Rules used when a polling worker does not declare its class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Identity prefixes treated as cloud workers.
    #[serde(default = "default_cloud_prefixes")]
    pub cloud_prefixes: Vec<String>,
    /// Identity prefixes treated as pc workers.
    #[serde(default = "default_pc_prefixes")]
    pub pc_prefixes: Vec<String>,
    /// Let unrecognized identities claim jobs of every target.
    /// When false they only see `any` jobs.
    #[serde(default)]
    pub permissive_unknown_workers: bool,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            cloud_prefixes: default_cloud_prefixes(),
            pc_prefixes: default_pc_prefixes(),
            permissive_unknown_workers: false,
        }
    }
}

fn default_cloud_prefixes() -> Vec<String> {
    vec!["render".to_string(), "cloud".to_string()]
}

fn default_pc_prefixes() -> Vec<String> {
    vec!["pc".to_string(), "local".to_string()]
}
