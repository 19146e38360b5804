//! Router assembly
//!
//! Mounts the feature routes under `/api/v1` next to the service routes and
//! applies the middleware stack.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::error::error_response;
use crate::features::{self, DatasetState};
use crate::ingest::{IngestOrchestrator, SnapshotLedger};
use crate::middleware;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn SnapshotLedger>,
    pub orchestrator: Arc<IngestOrchestrator>,
}

pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    let feature_state = DatasetState {
        ledger: state.ledger.clone(),
        orchestrator: state.orchestrator.clone(),
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
        .nest("/api/v1", features::router(feature_state))
        // Apply layers from innermost to outermost
        .layer(CompressionLayer::new())
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "MedCat Server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Ledger connectivity
async fn health(State(state): State<AppState>) -> Response {
    match state.ledger.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Ledger health check failed: {:?}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Ledger unavailable")
        },
    }
}
