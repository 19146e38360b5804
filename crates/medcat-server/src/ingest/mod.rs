//! Dataset ingestion
//!
//! Fetches external medical-data sources, persists each run as an artifact
//! under the storage directory, and records it as a snapshot in the ledger.
//!
//! # Architecture
//!
//! - **sources**: the closed set of dataset sources and name resolution
//! - **connector**: paged-API, bulk-file, archive-to-records and static connectors
//! - **catalogue**: the built-in connector for every source
//! - **registry**: connectors keyed by source, built once at startup
//! - **writer**: streaming write with SHA-256 and record counting
//! - **ledger**: source and snapshot history (PostgreSQL or in-memory)
//! - **orchestrator**: retry loop and ledger bookkeeping for one invocation
//! - **scheduler**: cron-driven sweeps over a configured source list
//! - **config**: `DATASET_*` environment variables
//!
//! # Public API
//!
//! Exposed over HTTP by `features::datasets`:
//! - `GET /api/v1/datasets` - List sources with their latest snapshot
//! - `GET /api/v1/datasets/:source/latest` - Latest snapshot for one source
//! - `POST /api/v1/datasets/:source/ingest` - Run an ingestion now

pub mod catalogue;
pub mod config;
pub mod connector;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod sources;
pub mod writer;

pub use config::DatasetConfig;
pub use error::IngestError;
pub use ledger::{
    InMemoryLedger, LedgerError, PgLedger, SnapshotLedger, SnapshotRecord, SourceRecord,
};
pub use orchestrator::IngestOrchestrator;
pub use registry::ConnectorRegistry;
pub use scheduler::{DatasetScheduler, SweepSummary};
pub use sources::DatasetSource;

use std::sync::Arc;

use tracing::info;

/// Register every known source in the ledger. Safe to run on every start.
pub async fn register_sources(ledger: &Arc<dyn SnapshotLedger>) -> Result<usize, LedgerError> {
    for source in DatasetSource::ALL {
        ledger.register_source(source, None).await?;
    }
    info!(count = DatasetSource::ALL.len(), "Dataset sources registered");
    Ok(DatasetSource::ALL.len())
}
