use crate::handler::health::health_handler;
use crate::handler::ingest::ingest_logs_handler;
use crate::handler::otlp::{otlp_logs_handler, otlp_traces_handler};
use crate::ingest::IngestionCoordinator;
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;

/// Build the main HTTP router (health + log ingestion).
pub fn main_router(coordinator: Arc<IngestionCoordinator>) -> Router {
    let v1_health_router = Router::new().route("/v1/health", get(health_handler));

    let v1_ingest_router = Router::new()
        .route("/v1/projects/{project_id}/logs", post(ingest_logs_handler))
        .with_state(coordinator);

    Router::new()
        .merge(v1_health_router)
        .merge(v1_ingest_router)
}

/// Build the OTLP HTTP router (logs + traces).
pub fn otlp_router(coordinator: Arc<IngestionCoordinator>) -> Router {
    Router::new()
        .route("/v1/traces", post(otlp_traces_handler))
        .route("/v1/logs", post(otlp_logs_handler))
        .with_state(coordinator)
}
