//! Route definitions for the DubHub HTTP API.
//!
//! Client routes are open (creation passes the admission gate inside the
//! service); worker routes require the shared worker key.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let max_upload = usize::try_from(state.config.storage.max_upload_size_bytes)
        .unwrap_or(usize::MAX);

    let api_routes = Router::new()
        .merge(client_routes())
        .merge(worker_routes(state.clone()))
        .route("/health", get(handlers::health::health));

    let cors = middleware::cors::build_cors_layer(&state.config.server.cors);

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(max_upload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum_middleware::from_fn(
            middleware::logging::request_logging,
        ))
        .with_state(state)
}

/// Job creation, status, download, discard and fallback escalation.
fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(handlers::jobs::create_url_job))
        .route("/jobs/upload", post(handlers::jobs::upload_job))
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::discard_job),
        )
        .route("/jobs/{id}/download", get(handlers::jobs::download_result))
        .route("/jobs/{id}/fallback", post(handlers::jobs::escalate_fallback))
}

/// Leasing and result reporting for external workers.
fn worker_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/jobs/next", get(handlers::worker::next_job))
        .route("/jobs/{id}/claim", post(handlers::worker::claim_job))
        .route("/jobs/{id}/complete", post(handlers::worker::complete_job))
        .route("/jobs/{id}/result", post(handlers::worker::upload_result))
        .route("/jobs/{id}/input", get(handlers::worker::download_input))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::worker_auth::require_worker_key,
        ))
}
