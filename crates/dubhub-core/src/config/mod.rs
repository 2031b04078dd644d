//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field has a serde default so a missing file still
//! yields a runnable configuration.

pub mod admission;
pub mod app;
pub mod database;
pub mod fallback;
pub mod lease;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};

use self::admission::AdmissionConfig;
use self::app::ServerConfig;
use self::database::DatabaseConfig;
use self::fallback::FallbackConfig;
use self::lease::LeaseConfig;
use self::logging::LoggingConfig;
use self::pipeline::PipelineConfig;
use self::storage::StorageConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Environment variable prefix (`DUBHUB__SERVER__PORT=9000`).
const ENV_PREFIX: &str = "DUBHUB";

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Artifact storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-IP admission limits.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Worker-to-target routing.
    #[serde(default)]
    pub lease: LeaseConfig,
    /// Remote worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// In-process fallback settings.
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// External media pipeline.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml` with an environment-specific overlay
    /// and environment variables prefixed with `DUBHUB__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false));
        Self::finish(builder)
    }

    /// Load configuration from an explicit file, still honouring
    /// environment overrides.
    pub fn load_file(path: &Path) -> Result<Self, AppError> {
        let builder = config::Config::builder().add_source(config::File::from(path).required(true));
        Self::finish(builder)
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppError> {
        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admission.bypass_ips")
                    .with_list_parse_key("lease.cloud_prefixes")
                    .with_list_parse_key("lease.pc_prefixes")
                    .with_list_parse_key("server.cors.allowed_origins"),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
