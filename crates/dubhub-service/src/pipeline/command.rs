//! External-command media pipeline.
//!
//! Runs the configured dubbing program as a child process with timeout
//! management and stderr capture.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use dubhub_core::config::pipeline::PipelineConfig;
use dubhub_core::error::{AppError, ErrorKind};
use dubhub_core::result::AppResult;
use dubhub_core::traits::MediaPipeline;

/// Characters of stderr kept in error messages.
const STDERR_TAIL_CHARS: usize = 2000;

/// Media pipeline backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandPipeline {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandPipeline {
    /// Build a pipeline from configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.as_ref().map(PathBuf::from),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Substitute `{input}`, `{output}` and `{output_dir}` in the argument
    /// template.
    pub fn substitute_args(&self, input: &str, output: &Path) -> Vec<String> {
        let output_str = output.to_string_lossy();
        let output_dir = output
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", input)
                    .replace("{output}", &output_str)
                    .replace("{output_dir}", &output_dir)
            })
            .collect()
    }
}

/// Keep the last `max` characters of a process stream.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect()
}

#[async_trait]
impl MediaPipeline for CommandPipeline {
    fn name(&self) -> &str {
        &self.program
    }

    async fn process(&self, input: &str, output: &Path) -> AppResult<()> {
        let args = self.substitute_args(input, output);
        let start = Instant::now();

        info!(
            program = %self.program,
            ?args,
            output = %output.display(),
            "Running media pipeline"
        );

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let result = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result,
            Err(_) => {
                error!(program = %self.program, timeout = ?self.timeout, "Media pipeline timed out");
                return Err(AppError::pipeline(format!(
                    "pipeline timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        let output_status = result.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::with_source(
                    ErrorKind::Pipeline,
                    format!("pipeline program not found: {}", self.program),
                    e,
                )
            } else {
                AppError::with_source(
                    ErrorKind::Pipeline,
                    format!("failed to start pipeline: {e}"),
                    e,
                )
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;

        if !output_status.status.success() {
            let code = output_status.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output_status.stderr);
            let stderr = tail(stderr.trim(), STDERR_TAIL_CHARS);
            error!(program = %self.program, code, duration_ms, %stderr, "Media pipeline failed");
            return Err(AppError::pipeline(format!(
                "pipeline exited with code {code}: {stderr}"
            )));
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            warn!(output = %output.display(), "Pipeline succeeded but produced no output");
            return Err(AppError::pipeline(format!(
                "pipeline produced no output at {}",
                output.display()
            )));
        }

        info!(program = %self.program, duration_ms, "Media pipeline completed");
        Ok(())
    }
}
