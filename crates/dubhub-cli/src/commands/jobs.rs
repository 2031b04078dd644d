//! Job inspection CLI commands.

use std::sync::Arc;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_core::traits::ArtifactStorage;
use dubhub_core::types::JobId;
use dubhub_database::repositories::{AdmissionRepository, JobRepository};
use dubhub_entity::job::{Job, JobStatus};
use dubhub_service::{AdmissionGate, JobService};
use dubhub_storage::LocalArtifactStorage;

/// Arguments for job commands
#[derive(Debug, Args)]
pub struct JobsArgs {
    /// Job subcommand
    #[command(subcommand)]
    pub command: JobsCommand,
}

/// Job subcommands
#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// Count jobs per status
    Status,
    /// List the most recent jobs
    List {
        /// Only jobs with this status
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum rows
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Show one job
    Show {
        /// Job id
        id: String,
    },
    /// Delete a job and its artifacts
    Discard {
        /// Job id
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// Job display row for table output
#[derive(Debug, Serialize, Tabled)]
struct JobRow {
    id: String,
    status: String,
    target: String,
    worker: String,
    created_at: String,
    error: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status.to_string(),
            target: job.target.to_string(),
            worker: job.worker_id.clone().unwrap_or_else(|| "-".to_string()),
            created_at: job.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            error: job.error_message.clone().unwrap_or_default(),
        }
    }
}

fn parse_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| AppError::validation(format!("Invalid job id: {raw}")))
}

/// Execute job commands
pub async fn execute(
    args: &JobsArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::create_db_pool(config).await?;
    let job_repo = Arc::new(JobRepository::new(db.pool().clone()));

    match &args.command {
        JobsCommand::Status => {
            let counts = job_repo.count_by_status().await?;
            println!("Job Status:");
            for status in JobStatus::ALL {
                let count = counts
                    .iter()
                    .find(|(s, _)| *s == status)
                    .map(|(_, c)| *c)
                    .unwrap_or(0);
                output::print_kv(status.as_str(), &count.to_string());
            }
        }
        JobsCommand::List { status, limit } => {
            let status = status
                .as_deref()
                .map(|s| s.parse::<JobStatus>())
                .transpose()
                .map_err(AppError::validation)?;
            let jobs = job_repo.list_recent(status, *limit).await?;
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            output::print_list(&rows, format);
        }
        JobsCommand::Show { id } => {
            let id = parse_id(id)?;
            let job = job_repo
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("Job {id} not found")))?;
            output::print_item(&job, format);
        }
        JobsCommand::Discard { id, force } => {
            let id = parse_id(id)?;
            if !force {
                let confirm = dialoguer::Confirm::new()
                    .with_prompt(format!("Delete job {id} and its files?"))
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::internal(format!("Input error: {e}")))?;
                if !confirm {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let storage: Arc<dyn ArtifactStorage> =
                Arc::new(LocalArtifactStorage::new(&config.storage.data_root).await?);
            let admission = Arc::new(AdmissionGate::new(
                Arc::new(AdmissionRepository::new(db.pool().clone())),
                &config.admission,
            ));
            let service = JobService::new(
                Arc::clone(&job_repo),
                admission,
                storage,
                None,
                config.storage.max_upload_size_bytes,
            );

            if service.discard(id).await? {
                output::print_success(&format!("Job {id} discarded."));
            } else {
                output::print_warning(&format!("Job {id} does not exist."));
            }
        }
    }

    db.close().await;
    Ok(())
}
