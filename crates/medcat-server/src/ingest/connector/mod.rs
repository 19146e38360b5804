//! Connector framework
//!
//! A connector turns one upstream source into a byte stream plus a little
//! descriptive metadata. It never touches the ledger or the storage tree; the
//! orchestrator and the writer own those. Four shapes cover every built-in
//! source:
//!
//! - [`PagedApiConnector`]: JSON REST endpoint walked page by page, one JSON
//!   line per item
//! - [`BulkFileConnector`]: a single file download streamed as-is
//! - [`ArchiveRecordsConnector`]: a ZIP download whose delimited-text member is
//!   re-emitted as JSON lines
//! - [`StaticConnector`]: a constant JSON document

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::header::HeaderName;
use tokio_util::sync::CancellationToken;

use super::error::IngestError;
use super::sources::DatasetSource;

mod archive;
mod bulk;
mod paged;
mod static_payload;

pub use archive::{ArchiveRecordsConfig, ArchiveRecordsConnector};
pub use bulk::{BulkFileConfig, BulkFileConnector};
pub use paged::{PageParser, PagedApiConfig, PagedApiConnector, Pagination};
pub use static_payload::StaticConnector;

pub const JSONL_EXTENSION: &str = ".jsonl";
pub const JSONL_CONTENT_TYPE: &str = "application/jsonl";
pub const JSON_EXTENSION: &str = ".json";
pub const JSON_CONTENT_TYPE: &str = "application/json";

pub type ByteStream = BoxStream<'static, Result<Bytes, IngestError>>;

/// Per-invocation context handed to [`DatasetConnector::prepare`]
#[derive(Debug, Clone)]
pub struct IngestContext {
    pub storage_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Cancelled when the invocation or the service is shutting down
    pub cancel: CancellationToken,
    /// Span of the invocation; connector logging nests under it
    pub span: tracing::Span,
}

pub struct ConnectorOutput {
    pub stream: ByteStream,
    /// Appended to the artifact name, including the leading dot
    pub file_extension: String,
    pub content_type: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Count reported by the connector itself; preferred over the measured one
    pub item_count: Option<u64>,
}

impl std::fmt::Debug for ConnectorOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorOutput")
            .field("file_extension", &self.file_extension)
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .field("item_count", &self.item_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait DatasetConnector: Send + Sync {
    fn source(&self) -> DatasetSource;

    /// Open the upstream and return a stream of its payload. Implementations
    /// should not buffer the full payload unless the format requires it.
    async fn prepare(&self, ctx: &IngestContext) -> Result<ConnectorOutput, IngestError>;
}

/// Header name and value sent with every upstream request
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub header: HeaderName,
    pub value: String,
}

impl ApiKey {
    /// `None` when no key is configured or the key is blank
    pub fn from_config(header: HeaderName, value: Option<String>) -> Option<Self> {
        value
            .filter(|value| !value.trim().is_empty())
            .map(|value| ApiKey { header, value })
    }
}

/// Race a request future against cancellation
pub(crate) async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, IngestError>
where
    F: std::future::Future<Output = Result<T, IngestError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IngestError::Cancelled),
        result = fut => result,
    }
}

/// Issue a GET and insist on a 2xx status
pub(crate) async fn fetch(
    request: reqwest::RequestBuilder,
    api_key: Option<&ApiKey>,
    cancel: &CancellationToken,
    describe: impl FnOnce() -> String,
) -> Result<reqwest::Response, IngestError> {
    let request = match api_key {
        Some(key) => request.header(key.header.clone(), &key.value),
        None => request,
    };

    let response = cancellable(cancel, async { Ok(request.send().await?) }).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::Upstream(format!("{}: {}", describe(), status)));
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_from_config() {
        let header = HeaderName::from_bytes(b"X-API-KEY").unwrap();
        let key = ApiKey::from_config(header.clone(), Some("secret".to_string())).unwrap();
        assert_eq!(key.header.as_str(), "x-api-key");
        assert_eq!(key.value, "secret");

        assert!(ApiKey::from_config(header.clone(), None).is_none());
        assert!(ApiKey::from_config(header, Some("  ".to_string())).is_none());
    }
}
