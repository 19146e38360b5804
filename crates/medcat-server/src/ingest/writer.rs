//! Streaming writer
//!
//! Persists a connector stream in one forward pass while hashing every byte
//! and, for JSON lines payloads, counting records. The payload lands in a
//! staging file first and is moved into the storage tree only after the
//! stream completed, so a destination path never holds a partial artifact.

use std::path::Path;

use futures::StreamExt;
use medcat_common::checksum::StreamingHasher;
use medcat_common::records::RecordCounter;
use medcat_common::types::ChecksumAlgorithm;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::connector::ByteStream;
use super::error::IngestError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Lower-case hex SHA-256 of the artifact
    pub checksum: String,
    /// Only measured when record counting was requested
    pub item_count: Option<u64>,
    pub bytes_written: u64,
}

/// Write `stream` to `destination` via `staging`.
///
/// The staging file is removed on every failure path, including
/// cancellation.
pub async fn write_stream(
    stream: ByteStream,
    staging: &Path,
    destination: &Path,
    count_records: bool,
    cancel: &CancellationToken,
) -> Result<WriteOutcome, IngestError> {
    match write_staged(stream, staging, count_records, cancel).await {
        Ok(outcome) => {
            if let Err(e) = promote(staging, destination).await {
                discard(staging).await;
                return Err(e);
            }
            debug!(
                path = %destination.display(),
                bytes = outcome.bytes_written,
                checksum = %outcome.checksum,
                "Artifact written"
            );
            Ok(outcome)
        },
        Err(e) => {
            discard(staging).await;
            Err(e)
        },
    }
}

async fn write_staged(
    mut stream: ByteStream,
    staging: &Path,
    count_records: bool,
    cancel: &CancellationToken,
) -> Result<WriteOutcome, IngestError> {
    if let Some(parent) = staging.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(staging).await?;

    let mut hasher = StreamingHasher::new(ChecksumAlgorithm::Sha256);
    let mut counter = count_records.then(RecordCounter::new);
    let mut bytes_written = 0u64;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(IngestError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk?;

        file.write_all(&chunk).await?;
        hasher.update(&chunk);
        if let Some(counter) = counter.as_mut() {
            counter.feed(&chunk);
        }
        bytes_written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;

    Ok(WriteOutcome {
        checksum: hasher.finalize_hex(),
        item_count: counter.map(RecordCounter::finish),
        bytes_written,
    })
}

/// Move the staging file into place, copying across filesystems. Existing
/// artifacts are never replaced.
async fn promote(staging: &Path, destination: &Path) -> Result<(), IngestError> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    if fs::try_exists(destination).await? {
        return Err(IngestError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Artifact {} already exists", destination.display()),
        )));
    }

    if fs::rename(staging, destination).await.is_ok() {
        return Ok(());
    }

    fs::copy(staging, destination).await?;
    fs::remove_file(staging).await?;
    Ok(())
}

async fn discard(staging: &Path) {
    match fs::remove_file(staging).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %staging.display(), error = %e, "Failed to remove staging file"),
    }
}
