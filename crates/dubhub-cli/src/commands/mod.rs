//! CLI command definitions and dispatch.

pub mod admission;
pub mod jobs;
pub mod migrate;
pub mod worker;

use std::path::Path;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_database::DatabasePool;

/// DubHub: media job coordinator
#[derive(Debug, Parser)]
#[command(name = "dubhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file. Without it `config/default.toml` and
    /// `config/$DUBHUB_ENV.toml` are merged.
    #[arg(short, long, env = "DUBHUB_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Inspect and discard jobs
    Jobs(jobs::JobsArgs),
    /// Inspect the per-IP admission ledger
    Admission(admission::AdmissionArgs),
    /// Run the pull worker
    Worker(worker::WorkerArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = load_config(self.config.as_deref())?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Jobs(args) => jobs::execute(args, &config, self.format).await,
            Commands::Admission(args) => admission::execute(args, &config, self.format).await,
            Commands::Worker(args) => worker::execute(args, config).await,
        }
    }
}

/// Helper: load configuration from an explicit file or the config directory
pub fn load_config(path: Option<&str>) -> Result<AppConfig, AppError> {
    match path {
        Some(path) => AppConfig::load_file(Path::new(path)),
        None => {
            let env = std::env::var("DUBHUB_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Helper: open the job database
pub async fn create_db_pool(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}
