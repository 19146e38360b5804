//! List sources query
//!
//! Every registered source with its most recent snapshot, ordered by name.

use std::sync::Arc;

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{LedgerError, SnapshotLedger, SourceRecord};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListSourcesQuery;

#[derive(Debug, thiserror::Error)]
pub enum ListSourcesError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl Request<Result<Vec<SourceRecord>, ListSourcesError>> for ListSourcesQuery {}

pub async fn handle(
    ledger: Arc<dyn SnapshotLedger>,
    _query: ListSourcesQuery,
) -> Result<Vec<SourceRecord>, ListSourcesError> {
    Ok(ledger.list_sources().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{DatasetSource, InMemoryLedger};

    #[tokio::test]
    async fn test_lists_registered_sources() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.register_source(DatasetSource::Synthea, None).await.unwrap();
        ledger.register_source(DatasetSource::DailyMed, None).await.unwrap();

        let sources = handle(ledger, ListSourcesQuery).await.unwrap();
        let names: Vec<_> = sources.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(names, vec!["DailyMed", "Synthea"]);
        assert!(sources.iter().all(|s| s.latest_snapshot.is_none()));
    }
}
