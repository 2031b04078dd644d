//! Pull worker command.

use std::sync::Arc;

use clap::{Args, Subcommand};
use tokio::sync::watch;
use tracing::info;

use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_core::traits::MediaPipeline;
use dubhub_service::CommandPipeline;
use dubhub_worker::WorkerRunner;

/// Arguments for worker commands
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Worker subcommand
    #[command(subcommand)]
    pub command: WorkerCommand,
}

/// Worker subcommands
#[derive(Debug, Subcommand)]
pub enum WorkerCommand {
    /// Poll the coordinator and process jobs until Ctrl+C
    Run {
        /// Declared class (`cloud` or `pc`), overriding `worker.class`
        #[arg(long)]
        class: Option<String>,
        /// Identity, overriding `worker.worker_id`
        #[arg(long)]
        worker_id: Option<String>,
        /// Coordinator base URL, overriding `worker.api_url`
        #[arg(long)]
        api_url: Option<String>,
    },
}

/// Execute worker commands
pub async fn execute(args: &WorkerArgs, mut config: AppConfig) -> Result<(), AppError> {
    match &args.command {
        WorkerCommand::Run {
            class,
            worker_id,
            api_url,
        } => {
            if let Some(class) = class {
                config.worker.class = class.clone();
            }
            if let Some(worker_id) = worker_id {
                config.worker.worker_id = Some(worker_id.clone());
            }
            if let Some(api_url) = api_url {
                config.worker.api_url = api_url.clone();
            }

            let pipeline: Arc<dyn MediaPipeline> =
                Arc::new(CommandPipeline::new(&config.pipeline));
            let runner = WorkerRunner::new(&config.worker, pipeline)?;

            let (cancel_tx, cancel_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, finishing current job");
                    let _ = cancel_tx.send(true);
                }
            });

            runner.run(cancel_rx).await;
        }
    }
    Ok(())
}
