//! Ingestion orchestrator
//!
//! Runs one on-demand or scheduled ingestion of a single source: resolve the
//! connector, retry prepare-and-write up to `max_retries` times with a fixed
//! backoff, and keep the ledger in step. A snapshot row is inserted as
//! `pending` on the first successful prepare and reused by later attempts;
//! it ends up `completed` or `failed`. A cancelled invocation stops without
//! finalising and leaves the row `pending`.
//!
//! Invocations for the same source are serialised; different sources run
//! independently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use medcat_common::types::SnapshotStatus;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use super::config::DatasetConfig;
use super::connector::{ConnectorOutput, DatasetConnector, IngestContext, JSONL_EXTENSION};
use super::error::IngestError;
use super::ledger::{LedgerError, NewSnapshot, SnapshotLedger, SnapshotRecord, SnapshotUpdate};
use super::registry::ConnectorRegistry;
use super::sources::DatasetSource;
use super::writer;

const FAILED_EXTENSION: &str = ".failed";

/// Everything fixed for the duration of one invocation
struct Job {
    source: DatasetSource,
    source_id: i32,
    connector: Arc<dyn DatasetConnector>,
    slug: String,
    /// Shared by every attempt so retries target the same artifact name
    timestamp: String,
    artifact_dir: PathBuf,
}

impl Job {
    fn artifact_path(&self, extension: &str) -> PathBuf {
        self.artifact_dir
            .join(format!("{}-{}{}", self.slug, self.timestamp, extension))
    }
}

/// Bookkeeping carried across attempts
#[derive(Default)]
struct AttemptState {
    attempt: u32,
    snapshot_id: Option<Uuid>,
    target_path: Option<PathBuf>,
    last_error: Option<IngestError>,
}

pub struct IngestOrchestrator {
    config: DatasetConfig,
    registry: Arc<ConnectorRegistry>,
    ledger: Arc<dyn SnapshotLedger>,
    /// Per-source lock guarding the last artifact timestamp issued
    locks: HashMap<DatasetSource, Arc<Mutex<Option<String>>>>,
    shutdown: CancellationToken,
}

impl IngestOrchestrator {
    pub fn new(
        config: DatasetConfig,
        registry: Arc<ConnectorRegistry>,
        ledger: Arc<dyn SnapshotLedger>,
        shutdown: CancellationToken,
    ) -> Self {
        let locks = DatasetSource::ALL
            .into_iter()
            .map(|source| (source, Arc::new(Mutex::new(None))))
            .collect();

        Self {
            config,
            registry,
            ledger,
            locks,
            shutdown,
        }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<dyn SnapshotLedger> {
        self.ledger.clone()
    }

    /// Ingest `name`, cancelled when the service shuts down
    pub async fn ingest(&self, name: &str) -> Result<SnapshotRecord, IngestError> {
        self.ingest_with_cancel(name, self.shutdown.child_token()).await
    }

    /// Ingest `name` under an explicit cancellation token
    pub async fn ingest_with_cancel(
        &self,
        name: &str,
        cancel: CancellationToken,
    ) -> Result<SnapshotRecord, IngestError> {
        let source = DatasetSource::resolve(name)
            .ok_or_else(|| IngestError::NotFound(format!("Unknown dataset source: {name}")))?;

        let connector = self.registry.get(source).ok_or_else(|| {
            IngestError::NotFound(format!("No connector registered for source {source}"))
        })?;

        let source_id = self.ledger.source_id(source).await?.ok_or_else(|| {
            IngestError::NotFound(format!("Source {source} not registered in database"))
        })?;

        let lock = self.locks.get(&source).cloned().unwrap_or_default();
        let span = info_span!("ingest", source = %source, attempt = field::Empty);

        async move {
            if lock.try_lock().is_err() {
                debug!("Waiting for in-flight ingestion of the same source");
            }
            let mut last_timestamp = lock.lock().await;
            let timestamp = next_timestamp(last_timestamp.as_deref()).await;
            *last_timestamp = Some(timestamp.clone());

            let slug = source.slug();
            let job = Job {
                source,
                source_id,
                connector,
                artifact_dir: self.config.storage_dir.join(&slug),
                slug,
                timestamp,
            };

            info!(max_attempts = self.config.max_retries, "Starting ingestion");
            self.run(&job, &cancel).await
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        job: &Job,
        cancel: &CancellationToken,
    ) -> Result<SnapshotRecord, IngestError> {
        let mut state = AttemptState::default();
        let max_attempts = self.config.max_retries;

        while state.attempt < max_attempts {
            state.attempt += 1;
            Span::current().record("attempt", state.attempt);

            match self.attempt(job, &mut state, cancel).await {
                Ok(snapshot) => {
                    info!(
                        snapshot_id = %snapshot.id,
                        location = %snapshot.storage_location,
                        "Ingestion completed"
                    );
                    return Ok(snapshot);
                },
                Err(e) if !e.is_retryable() => {
                    error!(error = %e, "Ingestion aborted");
                    return Err(e);
                },
                Err(e) => {
                    warn!(attempt = state.attempt, max_attempts, error = %e, "Ingestion attempt failed");
                    state.last_error = Some(e);

                    if cancel.is_cancelled() {
                        warn!(snapshot_id = ?state.snapshot_id, "Ingestion cancelled, snapshot left pending");
                        return Err(IngestError::Cancelled);
                    }

                    if state.attempt < max_attempts {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => {
                                warn!(snapshot_id = ?state.snapshot_id, "Ingestion cancelled during backoff");
                                return Err(IngestError::Cancelled);
                            },
                            _ = tokio::time::sleep(self.config.retry_backoff) => {},
                        }
                    }
                },
            }
        }

        self.record_failure(job, state).await
    }

    async fn attempt(
        &self,
        job: &Job,
        state: &mut AttemptState,
        cancel: &CancellationToken,
    ) -> Result<SnapshotRecord, IngestError> {
        let ctx = IngestContext {
            storage_dir: self.config.storage_dir.clone(),
            temp_dir: self.config.temp_dir.clone(),
            cancel: cancel.clone(),
            span: Span::current(),
        };

        let ConnectorOutput {
            stream,
            file_extension,
            content_type,
            mut metadata,
            item_count,
        } = job.connector.prepare(&ctx).await?;

        let target = job.artifact_path(&file_extension);
        let location = target.display().to_string();
        state.target_path = Some(target.clone());

        let snapshot_id = match state.snapshot_id {
            Some(id) => id,
            None => {
                let id = self
                    .ledger
                    .insert_snapshot(NewSnapshot {
                        source_id: job.source_id,
                        status: SnapshotStatus::Pending,
                        storage_location: location.clone(),
                    })
                    .await?;
                debug!(snapshot_id = %id, "Pending snapshot recorded");
                state.snapshot_id = Some(id);
                id
            },
        };

        let staging = self.config.temp_dir.join(format!(
            "{}-{}-{}{}.part",
            job.slug, job.timestamp, state.attempt, file_extension
        ));
        let outcome = writer::write_stream(
            stream,
            &staging,
            &target,
            file_extension == JSONL_EXTENSION,
            cancel,
        )
        .await?;

        if let Some(content_type) = content_type {
            metadata.insert("contentType".into(), Value::String(content_type));
        }
        if let Some(count) = item_count.or(outcome.item_count) {
            metadata.insert("itemCount".into(), Value::from(count));
        }

        self.ledger
            .update_snapshot(
                snapshot_id,
                SnapshotUpdate::completed(outcome.checksum, Value::Object(metadata), location),
            )
            .await?;

        let snapshot = self
            .ledger
            .latest_snapshot(job.source)
            .await?
            .ok_or(LedgerError::SnapshotNotFound(snapshot_id))?;
        Ok(snapshot)
    }

    /// Mark the invocation failed and hand back the last attempt's error
    async fn record_failure(
        &self,
        job: &Job,
        state: AttemptState,
    ) -> Result<SnapshotRecord, IngestError> {
        let error = state
            .last_error
            .unwrap_or_else(|| IngestError::Upstream("Failed to ingest dataset".to_string()));
        let message = error.to_string();

        let snapshot_id = match state.snapshot_id {
            Some(id) => {
                let location = state
                    .target_path
                    .unwrap_or_else(|| job.artifact_path(FAILED_EXTENSION))
                    .display()
                    .to_string();
                self.ledger
                    .update_snapshot(id, SnapshotUpdate::failed(message.clone(), location))
                    .await?;
                id
            },
            None => {
                let placeholder = job.artifact_path(FAILED_EXTENSION).display().to_string();
                let id = self
                    .ledger
                    .insert_snapshot(NewSnapshot {
                        source_id: job.source_id,
                        status: SnapshotStatus::Failed,
                        storage_location: placeholder.clone(),
                    })
                    .await?;
                self.ledger
                    .update_snapshot(id, SnapshotUpdate::failed(message.clone(), placeholder))
                    .await?;
                id
            },
        };

        error!(
            snapshot_id = %snapshot_id,
            attempts = state.attempt,
            error = %message,
            "Ingestion failed"
        );
        Err(error)
    }
}

/// UTC ISO-8601 with millisecond precision, `:` and `.` replaced by `-`
fn artifact_timestamp() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// A timestamp different from the previous invocation's for this source, so
/// back-to-back runs never share an artifact name
async fn next_timestamp(previous: Option<&str>) -> String {
    loop {
        let timestamp = artifact_timestamp();
        if previous != Some(timestamp.as_str()) {
            return timestamp;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::connector::{ByteStream, JSONL_CONTENT_TYPE};
    use crate::ingest::ledger::{InMemoryLedger, SourceRecord};
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;
    use medcat_common::checksum::verify_file_checksum;
    use medcat_common::types::ChecksumAlgorithm;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` prepares, then emits `lines`
    struct FlakyConnector {
        source: DatasetSource,
        failures: u32,
        calls: AtomicU32,
        lines: &'static str,
    }

    impl FlakyConnector {
        fn new(source: DatasetSource, failures: u32, lines: &'static str) -> Arc<Self> {
            Arc::new(Self {
                source,
                failures,
                calls: AtomicU32::new(0),
                lines,
            })
        }
    }

    #[async_trait]
    impl DatasetConnector for FlakyConnector {
        fn source(&self) -> DatasetSource {
            self.source
        }

        async fn prepare(&self, _ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(IngestError::Upstream(format!(
                    "Failed to fetch {} page 1: 503 Service Unavailable",
                    self.source
                )));
            }
            let stream: ByteStream =
                futures::stream::iter([Ok(Bytes::from_static(self.lines.as_bytes()))]).boxed();
            Ok(ConnectorOutput {
                stream,
                file_extension: JSONL_EXTENSION.to_string(),
                content_type: Some(JSONL_CONTENT_TYPE.to_string()),
                metadata: serde_json::Map::new(),
                item_count: None,
            })
        }
    }

    /// Emits one chunk and then never finishes
    struct StallingConnector;

    #[async_trait]
    impl DatasetConnector for StallingConnector {
        fn source(&self) -> DatasetSource {
            DatasetSource::Nhanes
        }

        async fn prepare(&self, _ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
            let first = futures::stream::iter([Ok(Bytes::from_static(b"{}\n"))]);
            let stream: ByteStream = first.chain(futures::stream::pending()).boxed();
            Ok(ConnectorOutput {
                stream,
                file_extension: JSONL_EXTENSION.to_string(),
                content_type: None,
                metadata: serde_json::Map::new(),
                item_count: None,
            })
        }
    }

    /// Registers sources but refuses to record snapshots
    struct BrokenLedger(InMemoryLedger);

    #[async_trait]
    impl SnapshotLedger for BrokenLedger {
        async fn register_source(
            &self,
            source: DatasetSource,
            description: Option<&str>,
        ) -> Result<i32, LedgerError> {
            self.0.register_source(source, description).await
        }

        async fn source_id(&self, source: DatasetSource) -> Result<Option<i32>, LedgerError> {
            self.0.source_id(source).await
        }

        async fn insert_snapshot(&self, _snapshot: NewSnapshot) -> Result<Uuid, LedgerError> {
            Err(LedgerError::UnknownSource("connection reset".into()))
        }

        async fn update_snapshot(&self, id: Uuid, update: SnapshotUpdate) -> Result<(), LedgerError> {
            self.0.update_snapshot(id, update).await
        }

        async fn latest_snapshot(
            &self,
            source: DatasetSource,
        ) -> Result<Option<SnapshotRecord>, LedgerError> {
            self.0.latest_snapshot(source).await
        }

        async fn list_sources(&self) -> Result<Vec<SourceRecord>, LedgerError> {
            self.0.list_sources().await
        }

        async fn ping(&self) -> Result<(), LedgerError> {
            Ok(())
        }
    }

    fn test_config(dir: &TempDir, max_retries: u32) -> DatasetConfig {
        let mut config = DatasetConfig::default();
        config.storage_dir = dir.path().join("datasets");
        config.temp_dir = dir.path().join("tmp");
        config.max_retries = max_retries;
        config.retry_backoff = Duration::from_millis(1);
        config
    }

    async fn orchestrator(
        config: DatasetConfig,
        connector: Arc<dyn DatasetConnector>,
    ) -> (IngestOrchestrator, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.register_source(connector.source(), None).await.unwrap();
        let registry = ConnectorRegistry::empty().with(connector);
        let orchestrator = IngestOrchestrator::new(
            config,
            Arc::new(registry),
            ledger.clone(),
            CancellationToken::new(),
        );
        (orchestrator, ledger)
    }

    #[test]
    fn test_artifact_timestamp_is_path_safe() {
        let ts = artifact_timestamp();
        assert!(!ts.contains(':'));
        assert!(!ts.contains('.'));
        assert!(ts.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let dir = TempDir::new().unwrap();
        let connector = FlakyConnector::new(DatasetSource::OpenFda, 2, "{\"a\":1}\n{\"b\":2}\n");
        let (orchestrator, ledger) = orchestrator(test_config(&dir, 3), connector.clone()).await;

        let snapshot = orchestrator.ingest("openfda").await.unwrap();

        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(snapshot.status, SnapshotStatus::Completed);
        assert_eq!(snapshot.source, "OpenFDA");
        assert_eq!(snapshot.checksum.as_ref().map(String::len), Some(64));
        assert_eq!(snapshot.metadata["itemCount"], 2);
        assert_eq!(snapshot.metadata["contentType"], "application/jsonl");
        assert!(snapshot.completed_at.is_some());

        let location = PathBuf::from(&snapshot.storage_location);
        assert!(location.starts_with(dir.path().join("datasets").join("openfda")));
        assert!(snapshot.storage_location.ends_with(".jsonl"));
        assert_eq!(
            std::fs::read_to_string(location).unwrap(),
            "{\"a\":1}\n{\"b\":2}\n"
        );

        assert_eq!(ledger.snapshots_for(DatasetSource::OpenFda).await.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_failure() {
        let dir = TempDir::new().unwrap();
        let connector = FlakyConnector::new(DatasetSource::Faers, u32::MAX, "");
        let (orchestrator, ledger) = orchestrator(test_config(&dir, 2), connector.clone()).await;

        let err = orchestrator.ingest("FAERS").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to fetch FAERS page 1: 503 Service Unavailable"
        );
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);

        let snapshots = ledger.snapshots_for(DatasetSource::Faers).await;
        assert_eq!(snapshots.len(), 1);
        let failed = &snapshots[0];
        assert_eq!(failed.status, SnapshotStatus::Failed);
        assert!(failed.storage_location.ends_with(".failed"));
        assert_eq!(failed.error.as_deref(), Some(err.to_string().as_str()));
        assert_eq!(failed.metadata["storageLocation"], failed.storage_location.as_str());
        assert!(failed.checksum.is_none());
    }

    #[tokio::test]
    async fn test_unknown_source_is_not_found() {
        let dir = TempDir::new().unwrap();
        let connector = FlakyConnector::new(DatasetSource::OpenFda, 0, "");
        let (orchestrator, _) = orchestrator(test_config(&dir, 3), connector).await;

        let err = orchestrator.ingest("NoSuchSource").await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(ref m) if m == "Unknown dataset source: NoSuchSource"));

        // known source, but nothing registered for it
        let err = orchestrator.ingest("DailyMed").await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ledger_failure_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let connector = FlakyConnector::new(DatasetSource::Synthea, 0, "{}\n");
        let ledger = Arc::new(BrokenLedger(InMemoryLedger::new()));
        ledger.register_source(DatasetSource::Synthea, None).await.unwrap();

        let orchestrator = IngestOrchestrator::new(
            test_config(&dir, 5),
            Arc::new(ConnectorRegistry::empty().with(connector.clone())),
            ledger,
            CancellationToken::new(),
        );

        let err = orchestrator.ingest("Synthea").await.unwrap_err();
        assert!(matches!(err, IngestError::Ledger(_)));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_leaves_snapshot_pending() {
        let dir = TempDir::new().unwrap();
        let (orchestrator, ledger) =
            orchestrator(test_config(&dir, 3), Arc::new(StallingConnector)).await;
        let orchestrator = Arc::new(orchestrator);

        let cancel = CancellationToken::new();
        let task = {
            let orchestrator = orchestrator.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { orchestrator.ingest_with_cancel("NHANES", cancel).await })
        };

        // wait for the pending row before cancelling
        let mut pending = false;
        for _ in 0..200 {
            if !ledger.snapshots_for(DatasetSource::Nhanes).await.is_empty() {
                pending = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(pending);
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));

        let snapshots = ledger.snapshots_for(DatasetSource::Nhanes).await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].status, SnapshotStatus::Pending);
        assert!(std::fs::read_dir(dir.path().join("tmp")).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_same_source_runs_are_serialised() {
        let dir = TempDir::new().unwrap();
        let connector = FlakyConnector::new(DatasetSource::DailyMed, 0, "{}\n");
        let (orchestrator, ledger) = orchestrator(test_config(&dir, 1), connector).await;
        let orchestrator = Arc::new(orchestrator);

        let (a, b) = tokio::join!(orchestrator.ingest("DailyMed"), orchestrator.ingest("dailymed"));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.id, b.id);
        assert_ne!(a.storage_location, b.storage_location);
        assert_eq!(ledger.snapshots_for(DatasetSource::DailyMed).await.len(), 2);

        for snapshot in [&a, &b] {
            assert!(verify_file_checksum(
                &snapshot.storage_location,
                snapshot.checksum.as_deref().unwrap(),
                ChecksumAlgorithm::Sha256
            )
            .unwrap());
        }
    }

    #[tokio::test]
    async fn test_next_timestamp_skips_previous() {
        let first = next_timestamp(None).await;
        let second = next_timestamp(Some(&first)).await;
        assert_ne!(first, second);
    }
}
