use async_trait::async_trait;
use chrono::Utc;
use medcat_common::types::SnapshotStatus;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    LedgerError, NewSnapshot, SnapshotLedger, SnapshotRecord, SnapshotUpdate, SourceRecord,
};
use crate::ingest::sources::DatasetSource;

#[derive(Default)]
struct State {
    sources: Vec<SourceRecord>,
    // insertion order doubles as creation order
    snapshots: Vec<(i32, SnapshotRecord)>,
}

/// Process-local ledger. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryLedger {
    state: RwLock<State>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot recorded for a source, oldest first
    pub async fn snapshots_for(&self, source: DatasetSource) -> Vec<SnapshotRecord> {
        let state = self.state.read().await;
        state
            .snapshots
            .iter()
            .filter(|(_, snapshot)| snapshot.source == source.as_str())
            .map(|(_, snapshot)| snapshot.clone())
            .collect()
    }
}

impl State {
    fn latest_for(&self, source_id: i32) -> Option<SnapshotRecord> {
        self.snapshots
            .iter()
            .rev()
            .find(|(id, _)| *id == source_id)
            .map(|(_, snapshot)| snapshot.clone())
    }
}

#[async_trait]
impl SnapshotLedger for InMemoryLedger {
    async fn register_source(
        &self,
        source: DatasetSource,
        description: Option<&str>,
    ) -> Result<i32, LedgerError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.sources.iter_mut().find(|s| s.source == source.as_str()) {
            if let Some(description) = description {
                existing.description = Some(description.to_string());
            }
            return Ok(existing.id);
        }

        let id = state.sources.len() as i32 + 1;
        state.sources.push(SourceRecord {
            id,
            source: source.as_str().to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
            latest_snapshot: None,
        });
        Ok(id)
    }

    async fn source_id(&self, source: DatasetSource) -> Result<Option<i32>, LedgerError> {
        let state = self.state.read().await;
        Ok(state
            .sources
            .iter()
            .find(|s| s.source == source.as_str())
            .map(|s| s.id))
    }

    async fn insert_snapshot(&self, snapshot: NewSnapshot) -> Result<Uuid, LedgerError> {
        let mut state = self.state.write().await;
        let source = state
            .sources
            .iter()
            .find(|s| s.id == snapshot.source_id)
            .map(|s| s.source.clone())
            .ok_or_else(|| LedgerError::UnknownSource(snapshot.source_id.to_string()))?;

        let id = Uuid::new_v4();
        state.snapshots.push((
            snapshot.source_id,
            SnapshotRecord {
                id,
                source,
                status: snapshot.status,
                storage_location: snapshot.storage_location,
                checksum: None,
                metadata: serde_json::json!({}),
                error: None,
                created_at: Utc::now(),
                completed_at: None,
            },
        ));
        Ok(id)
    }

    async fn update_snapshot(&self, id: Uuid, update: SnapshotUpdate) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let (_, snapshot) = state
            .snapshots
            .iter_mut()
            .find(|(_, snapshot)| snapshot.id == id)
            .ok_or(LedgerError::SnapshotNotFound(id))?;

        snapshot.status = update.status;
        if let Some(checksum) = update.checksum {
            snapshot.checksum = Some(checksum);
        }
        if let Some(metadata) = update.metadata {
            snapshot.metadata = metadata;
        }
        snapshot.error = update.error;
        if let Some(location) = update.storage_location {
            snapshot.storage_location = location;
        }
        snapshot.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        source: DatasetSource,
    ) -> Result<Option<SnapshotRecord>, LedgerError> {
        let state = self.state.read().await;
        let Some(source_id) = state
            .sources
            .iter()
            .find(|s| s.source == source.as_str())
            .map(|s| s.id)
        else {
            return Ok(None);
        };
        Ok(state.latest_for(source_id))
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>, LedgerError> {
        let state = self.state.read().await;
        let mut sources: Vec<SourceRecord> = state
            .sources
            .iter()
            .map(|s| SourceRecord {
                latest_snapshot: state.latest_for(s.id),
                ..s.clone()
            })
            .collect();
        sources.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(sources)
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_source_is_idempotent() {
        let ledger = InMemoryLedger::new();
        let first = ledger.register_source(DatasetSource::OpenFda, None).await.unwrap();
        let second = ledger
            .register_source(DatasetSource::OpenFda, Some("FDA adverse events"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let sources = ledger.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].description.as_deref(), Some("FDA adverse events"));
    }

    #[tokio::test]
    async fn test_update_coalesces_and_stamps_completion() {
        let ledger = InMemoryLedger::new();
        let source_id = ledger.register_source(DatasetSource::Nppes, None).await.unwrap();
        let id = ledger
            .insert_snapshot(NewSnapshot {
                source_id,
                status: SnapshotStatus::Pending,
                storage_location: "/tmp/nppes.bin".into(),
            })
            .await
            .unwrap();

        ledger
            .update_snapshot(
                id,
                SnapshotUpdate {
                    status: SnapshotStatus::Failed,
                    checksum: None,
                    metadata: None,
                    error: Some("boom".into()),
                    storage_location: None,
                },
            )
            .await
            .unwrap();

        let latest = ledger.latest_snapshot(DatasetSource::Nppes).await.unwrap().unwrap();
        assert_eq!(latest.status, SnapshotStatus::Failed);
        assert_eq!(latest.storage_location, "/tmp/nppes.bin");
        assert_eq!(latest.metadata, serde_json::json!({}));
        assert_eq!(latest.error.as_deref(), Some("boom"));
        assert!(latest.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_latest_is_most_recent_insert() {
        let ledger = InMemoryLedger::new();
        let source_id = ledger.register_source(DatasetSource::Synthea, None).await.unwrap();
        for location in ["a", "b", "c"] {
            ledger
                .insert_snapshot(NewSnapshot {
                    source_id,
                    status: SnapshotStatus::Pending,
                    storage_location: location.into(),
                })
                .await
                .unwrap();
        }

        let latest = ledger.latest_snapshot(DatasetSource::Synthea).await.unwrap().unwrap();
        assert_eq!(latest.storage_location, "c");
        assert!(ledger.latest_snapshot(DatasetSource::Seer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_snapshot() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .update_snapshot(Uuid::new_v4(), SnapshotUpdate::failed("x".into(), "y".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SnapshotNotFound(_)));
    }
}
