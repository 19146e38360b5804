//! Run one dataset ingestion from the command line
//!
//! Usage: cargo run --bin ingest-source -- --source DailyMed
//!
//! Uses DATABASE_URL when set, otherwise an in-memory ledger. Prints the
//! resulting snapshot as JSON.

use anyhow::{Context, Result};
use clap::Parser;
use medcat_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use medcat_server::{
    config::Config,
    db,
    ingest::{self, ConnectorRegistry, DatasetConfig, IngestOrchestrator},
};

#[derive(Parser, Debug)]
#[command(name = "ingest-source", version, about = "Ingest one MedCat dataset source")]
struct Args {
    /// Source name, e.g. "DailyMed" or "ClinicalTrials.gov"
    #[arg(short, long)]
    source: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = LogConfig::builder()
        .log_file_prefix("ingest-source")
        .filter_directives("medcat_server=info,sqlx=warn")
        .build()
        .merge_env()?;
    init_logging(&log_config)?;

    let config = Config::load()?;
    let dataset_config = DatasetConfig::from_env()?;

    let ledger = db::open_ledger(&config.database).await?;
    ingest::register_sources(&ledger).await?;

    let registry = Arc::new(ConnectorRegistry::builtin(&dataset_config)?);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling ingestion");
            ctrl_c.cancel();
        }
    });

    let orchestrator = IngestOrchestrator::new(dataset_config, registry, ledger, cancel);
    let snapshot = orchestrator
        .ingest(&args.source)
        .await
        .with_context(|| format!("Ingestion of {} failed", args.source))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
