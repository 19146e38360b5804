use std::io::{Cursor, Read};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::bulk::{BulkFileConfig, BulkFileConnector};
use super::{
    cancellable, ConnectorOutput, DatasetConnector, IngestContext, JSONL_CONTENT_TYPE,
    JSONL_EXTENSION,
};
use crate::ingest::error::IngestError;
use crate::ingest::sources::DatasetSource;

#[derive(Debug, Clone)]
pub struct ArchiveRecordsConfig {
    pub download: BulkFileConfig,
    /// Lower-case suffix of the member to read, e.g. `.tsv`
    pub member_suffix: String,
    pub delimiter: String,
}

impl ArchiveRecordsConfig {
    pub fn new(download_url: impl Into<String>) -> Self {
        Self {
            download: BulkFileConfig::new(download_url),
            member_suffix: ".tsv".to_string(),
            delimiter: "\t".to_string(),
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn member_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.member_suffix = suffix.into().to_lowercase();
        self
    }
}

/// Downloads a ZIP archive and re-emits its first delimited-text member as
/// JSON lines keyed by the header row.
///
/// The archive is held in memory: ZIP central directories live at the end of
/// the file, so nothing can be decoded before the download completes.
pub struct ArchiveRecordsConnector {
    source: DatasetSource,
    client: Client,
    config: ArchiveRecordsConfig,
}

impl ArchiveRecordsConnector {
    pub fn new(source: DatasetSource, client: Client, config: ArchiveRecordsConfig) -> Self {
        Self {
            source,
            client,
            config,
        }
    }
}

#[derive(Debug, PartialEq)]
struct Transcoded {
    lines: Vec<u8>,
    item_count: u64,
    headers: Vec<String>,
    member: String,
}

fn transcode(
    source: DatasetSource,
    archive: &[u8],
    member_suffix: &str,
    delimiter: &str,
) -> Result<Transcoded, IngestError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))?;

    let index = (0..zip.len())
        .find(|&i| {
            zip.by_index(i)
                .map(|entry| !entry.is_dir() && entry.name().to_lowercase().ends_with(member_suffix))
                .unwrap_or(false)
        })
        .ok_or_else(|| {
            IngestError::Format(format!(
                "ZIP archive for {source} does not contain a {member_suffix} file"
            ))
        })?;

    let mut entry = zip.by_index(index)?;
    let member = entry.name().to_string();
    let mut raw = Vec::new();
    entry.read_to_end(&mut raw)?;
    let text = String::from_utf8_lossy(&raw);

    // str::lines splits on \n and strips a trailing \r
    let mut rows = text.lines().filter(|line| !line.trim().is_empty());

    let Some(header_line) = rows.next() else {
        return Ok(Transcoded {
            lines: Vec::new(),
            item_count: 0,
            headers: Vec::new(),
            member,
        });
    };

    let headers: Vec<String> = header_line
        .split(delimiter)
        .map(|h| h.trim().to_string())
        .collect();

    let mut lines = Vec::new();
    let mut item_count = 0u64;
    for row in rows {
        let mut values = row.split(delimiter);
        let mut record = Map::with_capacity(headers.len());
        for header in &headers {
            let value = values.next().map(str::trim).unwrap_or_default();
            record.insert(header.clone(), Value::String(value.to_string()));
        }
        serde_json::to_writer(&mut lines, &record)?;
        lines.push(b'\n');
        item_count += 1;
    }

    Ok(Transcoded {
        lines,
        item_count,
        headers,
        member,
    })
}

#[async_trait]
impl DatasetConnector for ArchiveRecordsConnector {
    fn source(&self) -> DatasetSource {
        self.source
    }

    async fn prepare(&self, ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
        let response =
            BulkFileConnector::open(self.source, &self.client, &self.config.download, ctx).await?;
        let archive = cancellable(&ctx.cancel, async { Ok(response.bytes().await?) }).await?;
        debug!(source = %self.source, bytes = archive.len(), "Archive downloaded");

        let source = self.source;
        let suffix = self.config.member_suffix.clone();
        let delimiter = self.config.delimiter.clone();
        let transcoded =
            tokio::task::spawn_blocking(move || transcode(source, &archive, &suffix, &delimiter))
                .await??;

        info!(
            source = %self.source,
            member = %transcoded.member,
            records = transcoded.item_count,
            "Archive member converted to JSON lines"
        );

        let mut metadata = Map::new();
        metadata.insert("itemCount".into(), Value::from(transcoded.item_count));
        metadata.insert(
            "headers".into(),
            Value::Array(transcoded.headers.into_iter().map(Value::String).collect()),
        );
        metadata.insert("archiveMember".into(), Value::String(transcoded.member));

        let chunks = if transcoded.lines.is_empty() {
            Vec::new()
        } else {
            vec![Ok::<_, IngestError>(Bytes::from(transcoded.lines))]
        };

        Ok(ConnectorOutput {
            stream: futures::stream::iter(chunks).boxed(),
            file_extension: JSONL_EXTENSION.to_string(),
            content_type: Some(JSONL_CONTENT_TYPE.to_string()),
            metadata,
            item_count: Some(transcoded.item_count),
        })
    }
}
