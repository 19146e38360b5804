use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument};

use super::{
    cancellable, fetch, ApiKey, ConnectorOutput, DatasetConnector, IngestContext,
    JSONL_CONTENT_TYPE, JSONL_EXTENSION,
};
use crate::ingest::error::IngestError;
use crate::ingest::sources::DatasetSource;

/// Source-specific view of one decoded page
pub trait PageParser: Send + Sync {
    fn parse_items(&self, body: &Value) -> Vec<Value>;

    /// Whether another page should be requested after this one. Only asked
    /// for non-empty pages; an empty page always ends the walk.
    fn has_more(&self, _body: &Value, items: &[Value]) -> bool {
        !items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// 1-based page number
    Page { param: String },
    /// 0-based record offset advancing by the page size
    Offset { param: String },
}

impl Pagination {
    pub fn page(param: impl Into<String>) -> Self {
        Pagination::Page { param: param.into() }
    }

    pub fn offset(param: impl Into<String>) -> Self {
        Pagination::Offset { param: param.into() }
    }

    fn param(&self) -> &str {
        match self {
            Pagination::Page { param } | Pagination::Offset { param } => param,
        }
    }

    fn first(&self) -> u64 {
        match self {
            Pagination::Page { .. } => 1,
            Pagination::Offset { .. } => 0,
        }
    }

    fn advance(&self, cursor: u64, page_size: Option<u32>, returned: usize) -> u64 {
        match self {
            Pagination::Page { .. } => cursor + 1,
            Pagination::Offset { .. } => {
                cursor + page_size.map(u64::from).unwrap_or(returned as u64)
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PagedApiConfig {
    pub base_url: String,
    pub resource_path: String,
    pub pagination: Pagination,
    pub page_size_param: Option<String>,
    pub page_size: Option<u32>,
    pub static_params: Vec<(String, String)>,
    pub api_key: Option<ApiKey>,
}

impl PagedApiConfig {
    pub fn new(
        base_url: impl Into<String>,
        resource_path: impl Into<String>,
        pagination: Pagination,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            resource_path: resource_path.into(),
            pagination,
            page_size_param: None,
            page_size: None,
            static_params: Vec::new(),
            api_key: None,
        }
    }

    pub fn page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.page_size_param = Some(param.into());
        self.page_size = Some(size);
        self
    }

    pub fn static_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_params.push((key.into(), value.into()));
        self
    }

    pub fn api_key(mut self, api_key: Option<ApiKey>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Resource URL, treating the base as a directory even without a trailing slash
    fn endpoint(&self) -> Result<Url, IngestError> {
        let base = if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        };
        Url::parse(&base)
            .and_then(|base| base.join(&self.resource_path))
            .map_err(|e| IngestError::Upstream(format!("Invalid endpoint {base}{}: {e}", self.resource_path)))
    }

    fn query(&self, cursor: u64) -> Vec<(String, String)> {
        let mut params = vec![(self.pagination.param().to_string(), cursor.to_string())];
        if let (Some(param), Some(size)) = (&self.page_size_param, self.page_size) {
            params.push((param.clone(), size.to_string()));
        }
        params.extend(self.static_params.iter().cloned());
        params
    }
}

/// Walks a paginated JSON API lazily: a page is only requested once the
/// writer has consumed the previous one.
pub struct PagedApiConnector {
    source: DatasetSource,
    client: Client,
    config: Arc<PagedApiConfig>,
    parser: Arc<dyn PageParser>,
}

impl PagedApiConnector {
    pub fn new(
        source: DatasetSource,
        client: Client,
        config: PagedApiConfig,
        parser: impl PageParser + 'static,
    ) -> Self {
        Self {
            source,
            client,
            config: Arc::new(config),
            parser: Arc::new(parser),
        }
    }
}

struct Page {
    chunk: Bytes,
    next: Option<u64>,
}

struct PageFetcher {
    source: DatasetSource,
    client: Client,
    endpoint: Url,
    config: Arc<PagedApiConfig>,
    parser: Arc<dyn PageParser>,
    cancel: CancellationToken,
}

impl PageFetcher {
    /// `None` once the upstream returns an empty page
    async fn fetch_page(&self, cursor: u64) -> Result<Option<Page>, IngestError> {
        debug!(source = %self.source, cursor, url = %self.endpoint, "Requesting page");

        let request = self
            .client
            .get(self.endpoint.clone())
            .query(&self.config.query(cursor));
        let response = fetch(request, self.config.api_key.as_ref(), &self.cancel, || {
            format!("Failed to fetch {} page {}", self.source, cursor)
        })
        .await?;

        let body: Value = cancellable(&self.cancel, async { Ok(response.json().await?) }).await?;
        let items = self.parser.parse_items(&body);
        if items.is_empty() {
            debug!(source = %self.source, cursor, "Empty page, stopping");
            return Ok(None);
        }

        let mut chunk = Vec::new();
        for item in &items {
            serde_json::to_writer(&mut chunk, item)?;
            chunk.push(b'\n');
        }

        let next = self.parser.has_more(&body, &items).then(|| {
            self.config
                .pagination
                .advance(cursor, self.config.page_size, items.len())
        });

        Ok(Some(Page {
            chunk: Bytes::from(chunk),
            next,
        }))
    }
}

#[async_trait]
impl DatasetConnector for PagedApiConnector {
    fn source(&self) -> DatasetSource {
        self.source
    }

    async fn prepare(&self, ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
        let fetcher = Arc::new(PageFetcher {
            source: self.source,
            client: self.client.clone(),
            endpoint: self.config.endpoint()?,
            config: self.config.clone(),
            parser: self.parser.clone(),
            cancel: ctx.cancel.clone(),
        });
        let span = ctx.span.clone();

        let stream = futures::stream::try_unfold(
            Some(self.config.pagination.first()),
            move |cursor| {
                let fetcher = fetcher.clone();
                let span = span.clone();
                async move {
                    let Some(cursor) = cursor else {
                        return Ok::<_, IngestError>(None);
                    };
                    Ok(fetcher
                        .fetch_page(cursor)
                        .await?
                        .map(|page| (page.chunk, page.next)))
                }
                .instrument(span)
            },
        )
        .boxed();

        Ok(ConnectorOutput {
            stream,
            file_extension: JSONL_EXTENSION.to_string(),
            content_type: Some(JSONL_CONTENT_TYPE.to_string()),
            metadata: serde_json::Map::new(),
            item_count: None,
        })
    }
}
