//! Ingestion error taxonomy

use thiserror::Error;

use super::ledger::LedgerError;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Unknown source name, missing connector, or source absent from the ledger
    #[error("{0}")]
    NotFound(String),

    /// Upstream answered, but not with something usable (non-2xx status, etc.)
    #[error("{0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Payload could not be decoded (bad JSON, corrupt archive, missing member)
    #[error("Format error: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether another attempt may succeed. Lookup and ledger failures
    /// propagate immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, IngestError::NotFound(_) | IngestError::Ledger(_))
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(err: serde_json::Error) -> Self {
        IngestError::Format(err.to_string())
    }
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::Format(format!("Invalid ZIP archive: {err}"))
    }
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Io(std::io::Error::other(err.to_string()))
    }
}
