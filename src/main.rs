//! DubHub Server: media job coordinator.
//!
//! Main entry point that wires all crates together and starts the server.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use dubhub_core::config::AppConfig;
use dubhub_core::error::AppError;
use dubhub_core::traits::MediaPipeline;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from `DUBHUB_CONFIG`, or from `config/` for `DUBHUB_ENV`.
fn load_configuration() -> Result<AppConfig, AppError> {
    match std::env::var("DUBHUB_CONFIG") {
        Ok(path) => AppConfig::load_file(Path::new(&path)),
        Err(_) => {
            let env = std::env::var("DUBHUB_ENV").unwrap_or_else(|_| "development".to_string());
            AppConfig::load(&env)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting DubHub");

    // ── Step 1: Create data directories ──────────────────────────
    create_data_directories(&config).await?;

    // ── Step 2: Database connection + migrations ─────────────────
    let db = dubhub_database::DatabasePool::connect(&config.database).await?;
    dubhub_database::migration::run_migrations(db.pool()).await?;

    // ── Step 3: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 4: Media pipeline ───────────────────────────────────
    let pipeline: Arc<dyn MediaPipeline> =
        Arc::new(dubhub_service::CommandPipeline::new(&config.pipeline));
    tracing::info!(
        program = %config.pipeline.program,
        timeout_seconds = config.pipeline.timeout_seconds,
        "Media pipeline configured"
    );

    // ── Step 5: Services, lease coordinator and fallback ─────────
    let fallback_grace = Duration::from_secs(
        config
            .server
            .shutdown_grace_seconds
            .max(config.fallback.shutdown_timeout_seconds),
    );
    let app_state =
        dubhub_api::AppState::build(config.clone(), db.clone(), pipeline, shutdown_rx).await?;
    let fallback = app_state.fallback.clone();

    // ── Step 6: Build and start HTTP server ──────────────────────
    let app = dubhub_api::build_router(app_state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        AppError::with_source(
            dubhub_core::error::ErrorKind::Configuration,
            format!("Failed to bind {addr}"),
            e,
        )
    })?;

    tracing::info!(address = %addr, "DubHub server listening");

    // ── Step 7: Graceful shutdown ────────────────────────────────
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 8: Wait for fallback jobs ───────────────────────────
    if let Some(fallback) = fallback {
        tracing::info!(
            in_flight = fallback.in_flight().len(),
            "Waiting for fallback jobs to complete..."
        );
        if tokio::time::timeout(fallback_grace, fallback.join()).await.is_err() {
            tracing::warn!("Fallback did not stop in time; unfinished jobs resume on next start");
        }
    }

    db.close().await;
    tracing::info!("DubHub server shut down gracefully");
    Ok(())
}

/// Create required data directories
async fn create_data_directories(config: &AppConfig) -> Result<(), AppError> {
    let root = Path::new(&config.storage.data_root);
    let dirs = [root.join("inputs"), root.join("outputs")];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            AppError::with_source(
                dubhub_core::error::ErrorKind::Storage,
                format!("Failed to create dir '{}'", dir.display()),
                e,
            )
        })?;
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
