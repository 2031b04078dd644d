//! Admission ledger CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_database::repositories::AdmissionRepository;
use dubhub_entity::admission::IpAdmission;

/// Arguments for admission commands
#[derive(Debug, Args)]
pub struct AdmissionArgs {
    /// Admission subcommand
    #[command(subcommand)]
    pub command: AdmissionCommand,
}

/// Admission subcommands
#[derive(Debug, Subcommand)]
pub enum AdmissionCommand {
    /// Show the ledger entry of one address
    Show {
        /// Client IP
        ip: String,
    },
    /// List banned addresses
    Blocked,
}

#[derive(Debug, Serialize, Tabled)]
struct AdmissionRow {
    ip: String,
    requests: i64,
    blocked: bool,
    updated_at: String,
}

impl From<&IpAdmission> for AdmissionRow {
    fn from(entry: &IpAdmission) -> Self {
        Self {
            ip: entry.ip.clone(),
            requests: entry.request_count,
            blocked: entry.blocked,
            updated_at: entry.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Execute admission commands
pub async fn execute(
    args: &AdmissionArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let db = super::create_db_pool(config).await?;
    let repo = AdmissionRepository::new(db.pool().clone());

    match &args.command {
        AdmissionCommand::Show { ip } => match repo.find_by_ip(ip).await? {
            Some(entry) => {
                output::print_item(&entry, format);
                output::print_kv("limit", &config.admission.max_requests_per_ip.to_string());
            }
            None => output::print_warning(&format!("No requests recorded for {ip}.")),
        },
        AdmissionCommand::Blocked => {
            let rows: Vec<AdmissionRow> =
                repo.list_blocked().await?.iter().map(AdmissionRow::from).collect();
            output::print_list(&rows, format);
        }
    }

    db.close().await;
    Ok(())
}
