//! Latest snapshot query

use std::sync::Arc;

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{DatasetSource, LedgerError, SnapshotLedger, SnapshotRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetLatestSnapshotQuery {
    /// Source display name, matched case-insensitively
    pub source: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GetLatestSnapshotError {
    #[error("Unknown dataset source: {0}")]
    UnknownSource(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// `None` when the source is known but has never been ingested
impl Request<Result<Option<SnapshotRecord>, GetLatestSnapshotError>> for GetLatestSnapshotQuery {}

pub async fn handle(
    ledger: Arc<dyn SnapshotLedger>,
    query: GetLatestSnapshotQuery,
) -> Result<Option<SnapshotRecord>, GetLatestSnapshotError> {
    let source = DatasetSource::resolve(&query.source)
        .ok_or(GetLatestSnapshotError::UnknownSource(query.source))?;

    Ok(ledger.latest_snapshot(source).await?)
}
