//! Remote worker configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by the coordinator (key check) and the pull worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Shared secret sent by workers in the `X-API-Key` header.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    /// Base URL of the coordinator, used by the pull worker.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Worker identity. Defaults to `<class>-<hostname>-<pid>`.
    #[serde(default)]
    pub worker_id: Option<String>,
    /// Declared worker class: `"cloud"` or `"pc"`.
    #[serde(default = "default_class")]
    pub class: String,
    /// Interval in seconds between polls when the queue is empty.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
    /// HTTP request timeout in seconds (uploads and downloads included).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            api_url: default_api_url(),
            worker_id: None,
            class: default_class(),
            poll_interval_seconds: default_poll_interval(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_api_key() -> String {
    "change-me-in-production".to_string()
}

fn default_api_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_class() -> String {
    "pc".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    300
}
