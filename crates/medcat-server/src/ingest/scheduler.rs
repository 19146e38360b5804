//! Recurring ingestion
//!
//! Runs a configured list of sources on a cron schedule. Each tick ingests
//! the sources one after another; a failing source is logged and the sweep
//! moves on.

use std::sync::Arc;

use anyhow::Context;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use super::config::DatasetConfig;
use super::error::IngestError;
use super::orchestrator::IngestOrchestrator;
use super::sources::DatasetSource;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct DatasetScheduler {
    orchestrator: Arc<IngestOrchestrator>,
    cron_expression: String,
    sources: Vec<DatasetSource>,
}

impl DatasetScheduler {
    /// Resolve the configured source names. Unknown names are logged and
    /// dropped; duplicates run once.
    pub fn new(orchestrator: Arc<IngestOrchestrator>, config: &DatasetConfig) -> Self {
        let mut sources = Vec::new();
        for name in &config.scheduled_sources {
            match DatasetSource::resolve(name) {
                Some(source) if !sources.contains(&source) => sources.push(source),
                Some(_) => {},
                None => warn!(source = %name, "Ignoring unknown scheduled dataset source"),
            }
        }

        Self {
            orchestrator,
            cron_expression: normalize_cron(&config.cron_expression),
            sources,
        }
    }

    pub fn sources(&self) -> &[DatasetSource] {
        &self.sources
    }

    /// Nothing to schedule
    pub fn is_inert(&self) -> bool {
        self.sources.is_empty()
    }

    /// Ingest every configured source once, sequentially
    pub async fn run_sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        info!(sources = self.sources.len(), "Scheduled dataset sweep started");

        for source in &self.sources {
            match self.orchestrator.ingest(source.as_str()).await {
                Ok(snapshot) => {
                    info!(source = %source, snapshot_id = %snapshot.id, "Scheduled ingestion completed");
                    summary.succeeded += 1;
                },
                Err(IngestError::Cancelled) => {
                    warn!(source = %source, "Scheduled sweep interrupted by shutdown");
                    summary.failed += 1;
                    break;
                },
                Err(e) => {
                    error!(source = %source, error = %e, "Scheduled ingestion failed");
                    summary.failed += 1;
                },
            }
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Scheduled dataset sweep finished"
        );
        summary
    }

    /// Register the sweep with a cron scheduler and start it. Returns `None`
    /// when no source is scheduled. The caller owns the handle and should
    /// call `shutdown` on it when the service stops.
    pub async fn start(&self) -> anyhow::Result<Option<JobScheduler>> {
        if self.is_inert() {
            info!("No scheduled dataset sources configured, scheduler disabled");
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating dataset scheduler")?;

        let sweeper = self.clone();
        let job = Job::new_async(&self.cron_expression, move |_uuid, _lock| {
            let sweeper = sweeper.clone();
            Box::pin(async move {
                sweeper.run_sweep().await;
            })
        })
        .with_context(|| format!("creating dataset sweep for cron '{}'", self.cron_expression))?;

        sched.add(job).await.context("adding dataset sweep job")?;
        sched.start().await.context("starting dataset scheduler")?;

        let names: Vec<&str> = self.sources.iter().map(DatasetSource::as_str).collect();
        info!(cron = %self.cron_expression, sources = ?names, "Dataset scheduler started");
        Ok(Some(sched))
    }
}

/// Accept classic 5-field expressions by prepending a seconds field
pub fn normalize_cron(expression: &str) -> String {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::connector::{BulkFileConfig, BulkFileConnector, StaticConnector};
    use crate::ingest::ledger::{InMemoryLedger, SnapshotLedger};
    use crate::ingest::registry::ConnectorRegistry;
    use medcat_common::types::SnapshotStatus;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    async fn setup(
        dir: &TempDir,
        scheduled: &[&str],
    ) -> (DatasetScheduler, Arc<InMemoryLedger>) {
        let mut config = DatasetConfig::default();
        config.storage_dir = dir.path().join("datasets");
        config.temp_dir = dir.path().join("tmp");
        config.max_retries = 1;
        config.retry_backoff = Duration::from_millis(1);
        config.scheduled_sources = scheduled.iter().map(|s| s.to_string()).collect();

        let ledger = Arc::new(InMemoryLedger::new());
        for source in DatasetSource::ALL {
            ledger.register_source(source, None).await.unwrap();
        }

        // nothing listens on port 1, so the download fails fast
        let registry = ConnectorRegistry::empty()
            .with(Arc::new(StaticConnector::notice(DatasetSource::Seer, "manual upload")))
            .with(Arc::new(BulkFileConnector::new(
                DatasetSource::Nppes,
                reqwest::Client::new(),
                BulkFileConfig::new("http://127.0.0.1:1/NPI_Files.zip"),
            )));

        let orchestrator = Arc::new(IngestOrchestrator::new(
            config.clone(),
            Arc::new(registry),
            ledger.clone(),
            CancellationToken::new(),
        ));
        (DatasetScheduler::new(orchestrator, &config), ledger)
    }

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("0 3 * * *"), "0 0 3 * * *");
        assert_eq!(normalize_cron("  */5  * * * * "), "0 */5 * * * *");
        assert_eq!(normalize_cron("30 0 3 * * *"), "30 0 3 * * *");
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_names_are_dropped() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _) = setup(&dir, &["SEER Program", "nope", "seer program", "NPPES"]).await;
        assert_eq!(
            scheduler.sources(),
            &[DatasetSource::Seer, DatasetSource::Nppes]
        );
    }

    #[tokio::test]
    async fn test_sweep_survives_a_failing_source() {
        let dir = TempDir::new().unwrap();
        let (scheduler, ledger) = setup(&dir, &["NPPES", "SEER Program"]).await;

        let summary = scheduler.run_sweep().await;
        assert_eq!(summary, SweepSummary { succeeded: 1, failed: 1 });

        let nppes = ledger.latest_snapshot(DatasetSource::Nppes).await.unwrap().unwrap();
        assert_eq!(nppes.status, SnapshotStatus::Failed);
        let seer = ledger.latest_snapshot(DatasetSource::Seer).await.unwrap().unwrap();
        assert_eq!(seer.status, SnapshotStatus::Completed);
    }

    #[tokio::test]
    async fn test_inert_without_sources() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _) = setup(&dir, &["unknown"]).await;
        assert!(scheduler.is_inert());
        assert!(scheduler.start().await.unwrap().is_none());
    }
}
