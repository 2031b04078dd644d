//! External media pipeline configuration.

use serde::{Deserialize, Serialize};

/// Command used to turn an input video into a dubbed output video.
///
/// `{input}` and `{output}` in `args` are replaced with the input reference
/// (local path or source URL) and the output path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Program to execute.
    #[serde(default = "default_program")]
    pub program: String,
    /// Argument template.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Working directory for the process.
    #[serde(default)]
    pub working_dir: Option<String>,
    /// Timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            working_dir: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_program() -> String {
    "dubhub-pipeline".to_string()
}

fn default_args() -> Vec<String> {
    vec!["{input}".to_string(), "{output}".to_string()]
}

fn default_timeout() -> u64 {
    1800
}
