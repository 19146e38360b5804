//! MedCat Server Library
//!
//! Dataset ingestion service for the MedCat medical-data catalog.
//!
//! # Overview
//!
//! - **Ingestion**: connectors for every catalogued source, a retrying
//!   orchestrator, and a cron scheduler (see [`ingest`])
//! - **Snapshot ledger**: PostgreSQL via SQLx, or in memory without a database
//! - **API Endpoints**: read access to the ledger and an on-demand trigger
//! - **Configuration**: environment-based configuration management
//!
//! ## Framework Stack
//!
//! - **Axum**: web framework
//! - **SQLx**: PostgreSQL access and migrations
//! - **Tower**: middleware and service abstractions
//!
//! # Example
//!
//! ```no_run
//! use medcat_server::ingest::{
//!     register_sources, ConnectorRegistry, DatasetConfig, InMemoryLedger, IngestOrchestrator,
//!     SnapshotLedger,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DatasetConfig::from_env()?;
//!     let ledger: Arc<dyn SnapshotLedger> = Arc::new(InMemoryLedger::new());
//!     register_sources(&ledger).await?;
//!
//!     let registry = Arc::new(ConnectorRegistry::builtin(&config)?);
//!     let orchestrator =
//!         IngestOrchestrator::new(config, registry, ledger, CancellationToken::new());
//!     let snapshot = orchestrator.ingest("DailyMed").await?;
//!     tracing::info!(id = %snapshot.id, "ingested");
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;

// Re-export commonly used types
pub use error::{AppError, AppResult};
