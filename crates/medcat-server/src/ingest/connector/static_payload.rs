use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use serde_json::{json, Map, Value};

use super::{ConnectorOutput, DatasetConnector, IngestContext, JSON_CONTENT_TYPE, JSON_EXTENSION};
use crate::ingest::error::IngestError;
use crate::ingest::sources::DatasetSource;

enum Payload {
    Fixed(Value),
    /// `{ message, generatedAt }`, stamped at prepare time
    Notice(String),
}

/// Emits a constant JSON document. Used for sources without a public feed.
pub struct StaticConnector {
    source: DatasetSource,
    payload: Payload,
}

impl StaticConnector {
    pub fn new(source: DatasetSource, payload: Value) -> Self {
        Self {
            source,
            payload: Payload::Fixed(payload),
        }
    }

    pub fn notice(source: DatasetSource, message: impl Into<String>) -> Self {
        Self {
            source,
            payload: Payload::Notice(message.into()),
        }
    }

    fn render(&self) -> Value {
        match &self.payload {
            Payload::Fixed(value) => value.clone(),
            Payload::Notice(message) => json!({
                "message": message,
                "generatedAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            }),
        }
    }
}

#[async_trait]
impl DatasetConnector for StaticConnector {
    fn source(&self) -> DatasetSource {
        self.source
    }

    async fn prepare(&self, _ctx: &IngestContext) -> Result<ConnectorOutput, IngestError> {
        let payload = self.render();
        let item_count = payload.as_array().map(|items| items.len() as u64);

        let mut metadata = Map::new();
        if let Some(count) = item_count {
            metadata.insert("itemCount".into(), Value::from(count));
        }

        let body = serde_json::to_vec_pretty(&payload)?;
        Ok(ConnectorOutput {
            stream: futures::stream::iter([Ok::<_, IngestError>(Bytes::from(body))]).boxed(),
            file_extension: JSON_EXTENSION.to_string(),
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            metadata,
            item_count,
        })
    }
}
