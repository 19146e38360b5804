//! Dataset routes
//!
//! - `GET /` lists every source with its latest snapshot
//! - `GET /:source/latest` returns the latest snapshot, `204` if none yet
//! - `POST /:source/ingest` runs an ingestion and answers `202` when it completes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use super::commands::{self, IngestDatasetCommand};
use super::queries::{
    self, GetLatestSnapshotError, GetLatestSnapshotQuery, ListSourcesError, ListSourcesQuery,
};
use super::DatasetState;
use crate::error::{AppError, AppResult};

pub fn datasets_routes() -> Router<DatasetState> {
    Router::new()
        .route("/", get(list_sources))
        .route("/:source/latest", get(get_latest_snapshot))
        .route("/:source/ingest", post(ingest_source))
}

#[tracing::instrument(skip(state))]
async fn list_sources(State(state): State<DatasetState>) -> AppResult<Response> {
    let sources = queries::list_sources::handle(state.ledger, ListSourcesQuery).await?;
    tracing::debug!(count = sources.len(), "Dataset sources listed via API");
    Ok((StatusCode::OK, Json(sources)).into_response())
}

#[tracing::instrument(skip(state), fields(source = %source))]
async fn get_latest_snapshot(
    State(state): State<DatasetState>,
    Path(source): Path<String>,
) -> AppResult<Response> {
    let query = GetLatestSnapshotQuery { source };

    match queries::get_latest_snapshot::handle(state.ledger, query).await? {
        Some(snapshot) => Ok((StatusCode::OK, Json(snapshot)).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

#[tracing::instrument(skip(state), fields(source = %source))]
async fn ingest_source(
    State(state): State<DatasetState>,
    Path(source): Path<String>,
) -> AppResult<Response> {
    let command = IngestDatasetCommand { source };
    let snapshot = commands::ingest::handle(state.orchestrator, command).await?;

    tracing::info!(
        snapshot_id = %snapshot.id,
        status = %snapshot.status,
        "Dataset ingested via API"
    );

    Ok((StatusCode::ACCEPTED, Json(snapshot)).into_response())
}

impl From<ListSourcesError> for AppError {
    fn from(err: ListSourcesError) -> Self {
        match err {
            ListSourcesError::Ledger(e) => AppError::Ledger(e),
        }
    }
}

impl From<GetLatestSnapshotError> for AppError {
    fn from(err: GetLatestSnapshotError) -> Self {
        match err {
            e @ GetLatestSnapshotError::UnknownSource(_) => AppError::NotFound(e.to_string()),
            GetLatestSnapshotError::Ledger(e) => AppError::Ledger(e),
        }
    }
}
