//! Datasets feature module
//!
//! Read access to the snapshot ledger and the on-demand ingestion trigger.

pub mod commands;
pub mod queries;
pub mod routes;

use std::sync::Arc;

use crate::ingest::{IngestOrchestrator, SnapshotLedger};

pub use commands::IngestDatasetCommand;
pub use queries::{
    GetLatestSnapshotError, GetLatestSnapshotQuery, ListSourcesError, ListSourcesQuery,
};
pub use routes::datasets_routes;

#[derive(Clone)]
pub struct DatasetState {
    pub ledger: Arc<dyn SnapshotLedger>,
    pub orchestrator: Arc<IngestOrchestrator>,
}
