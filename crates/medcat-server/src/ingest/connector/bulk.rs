use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderName, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::info;

use super::{fetch, ApiKey, ConnectorOutput, DatasetConnector, IngestContext};
use crate::ingest::error::IngestError;
use crate::ingest::sources::DatasetSource;

#[derive(Debug, Clone)]
pub struct BulkFileConfig {
    pub download_url: String,
    pub api_key: Option<ApiKey>,
}

impl BulkFileConfig {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            api_key: None,
        }
    }

    pub fn api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }
}

/// Streams a single upstream file through unchanged
pub struct BulkFileConnector {
    source: DatasetSource,
    client: Client,
    config: BulkFileConfig,
}

impl BulkFileConnector {
    pub fn new(source: DatasetSource, client: Client, config: BulkFileConfig) -> Self {
        Self {
            source,
            client,
            config,
        }
    }

    /// Issue the download request. Shared with the archive connector.
    pub(crate) async fn open(
        source: DatasetSource,
        client: &Client,
        config: &BulkFileConfig,
        ctx: &IngestContext,
    ) -> Result<reqwest::Response, IngestError> {
        info!(source = %source, url = %config.download_url, "Downloading dataset");
        fetch(
            client.get(&config.download_url),
            config.api_key.as_ref(),
            &ctx.cancel,
            || format!("Failed to download {source}"),
        )
        .await
    }
}

/// `.zip` when the upstream says so, `.bin` otherwise
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    match content_type {
        Some(ct) if ct.to_ascii_lowercase().contains("zip") => ".zip",
        _ => ".bin",
    }
}

fn header_metadata(response: &reqwest::Response, url: &str) -> Map<String, Value> {
    let headers = response.headers();
    let text = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let mut metadata = Map::new();
    metadata.insert("sourceUrl".into(), Value::String(url.to_string()));
    if let Some(length) = text(CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok()) {
        metadata.insert("contentLength".into(), Value::from(length));
    }
    if let Some(modified) = text(LAST_MODIFIED) {
        metadata.insert("lastModified".into(), Value::String(modified));
    }
    if let Some(etag) = text(ETAG) {
        metadata.insert("etag".into(), Value::String(etag));
    }
    metadata
}

#[async_trait]
impl DatasetConnector for BulkFileConnector {
    fn source(&self) -> DatasetSource {
        self.source
    }

    async fn prepare(&self, ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
        let response = Self::open(self.source, &self.client, &self.config, ctx).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let metadata = header_metadata(&response, &self.config.download_url);

        Ok(ConnectorOutput {
            stream: response.bytes_stream().map_err(IngestError::from).boxed(),
            file_extension: extension_for(content_type.as_deref()).to_string(),
            content_type,
            metadata,
            item_count: None,
        })
    }
}
