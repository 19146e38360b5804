//! Snapshot ledger
//!
//! Durable record of known sources and the snapshot history of each. The
//! orchestrator only ever inserts a snapshot and then updates it; nothing is
//! deleted. [`PgLedger`] is the production store, [`InMemoryLedger`] backs
//! tests and database-less local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use medcat_common::types::SnapshotStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::sources::DatasetSource;

mod memory;
mod postgres;

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Snapshot {0} not found")]
    SnapshotNotFound(Uuid),

    #[error("Source {0} is not registered")]
    UnknownSource(String),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(#[from] medcat_common::MdcError),
}

/// One snapshot row as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub source: String,
    pub status: SnapshotStatus,
    pub storage_location: String,
    pub checksum: Option<String>,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A registered source with its most recent snapshot, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub id: i32,
    pub source: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub latest_snapshot: Option<SnapshotRecord>,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub source_id: i32,
    pub status: SnapshotStatus,
    pub storage_location: String,
}

/// Finalising update. `None` for checksum, metadata or storage location keeps
/// the stored value; `error` is always overwritten and `completed_at` stamped.
#[derive(Debug, Clone)]
pub struct SnapshotUpdate {
    pub status: SnapshotStatus,
    pub checksum: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub error: Option<String>,
    pub storage_location: Option<String>,
}

impl SnapshotUpdate {
    pub fn completed(checksum: String, metadata: serde_json::Value, storage_location: String) -> Self {
        Self {
            status: SnapshotStatus::Completed,
            checksum: Some(checksum),
            metadata: Some(metadata),
            error: None,
            storage_location: Some(storage_location),
        }
    }

    pub fn failed(error: String, storage_location: String) -> Self {
        Self {
            status: SnapshotStatus::Failed,
            checksum: None,
            metadata: Some(serde_json::json!({ "storageLocation": storage_location })),
            error: Some(error),
            storage_location: Some(storage_location),
        }
    }
}

#[async_trait]
pub trait SnapshotLedger: Send + Sync {
    /// Idempotent upsert; returns the ledger id of the source
    async fn register_source(
        &self,
        source: DatasetSource,
        description: Option<&str>,
    ) -> Result<i32, LedgerError>;

    async fn source_id(&self, source: DatasetSource) -> Result<Option<i32>, LedgerError>;

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Uuid, LedgerError>;

    async fn update_snapshot(&self, id: Uuid, update: SnapshotUpdate) -> Result<(), LedgerError>;

    /// Most recent snapshot by creation time
    async fn latest_snapshot(
        &self,
        source: DatasetSource,
    ) -> Result<Option<SnapshotRecord>, LedgerError>;

    /// All registered sources ordered by name, each with its latest snapshot
    async fn list_sources(&self) -> Result<Vec<SourceRecord>, LedgerError>;

    /// Connectivity check for health probes
    async fn ping(&self) -> Result<(), LedgerError>;
}
