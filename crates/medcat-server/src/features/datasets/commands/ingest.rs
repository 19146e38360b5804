//! Ingest dataset command
//!
//! Runs one ingestion of the named source and waits for it to finish.

use std::sync::Arc;

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::ingest::{IngestError, IngestOrchestrator, SnapshotRecord};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestDatasetCommand {
    pub source: String,
}

impl Request<Result<SnapshotRecord, IngestError>> for IngestDatasetCommand {}

#[tracing::instrument(skip(orchestrator), fields(source = %command.source))]
pub async fn handle(
    orchestrator: Arc<IngestOrchestrator>,
    command: IngestDatasetCommand,
) -> Result<SnapshotRecord, IngestError> {
    orchestrator.ingest(&command.source).await
}
