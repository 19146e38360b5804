use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use super::catalogue::builtin_connector;
use super::config::DatasetConfig;
use super::connector::DatasetConnector;
use super::sources::DatasetSource;

/// Connectors keyed by source, built once at startup
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<DatasetSource, Arc<dyn DatasetConnector>>,
}

impl ConnectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in source, sharing one HTTP client
    pub fn builtin(config: &DatasetConfig) -> anyhow::Result<Self> {
        let client = http_client(config)?;
        Ok(Self::builtin_with_client(config, client))
    }

    pub fn builtin_with_client(config: &DatasetConfig, client: Client) -> Self {
        let connectors = DatasetSource::ALL
            .into_iter()
            .map(|source| (source, builtin_connector(source, config, client.clone())))
            .collect();
        Self { connectors }
    }

    /// Replace the connector registered for the connector's source
    pub fn insert(&mut self, connector: Arc<dyn DatasetConnector>) {
        self.connectors.insert(connector.source(), connector);
    }

    pub fn with(mut self, connector: Arc<dyn DatasetConnector>) -> Self {
        self.insert(connector);
        self
    }

    pub fn get(&self, source: DatasetSource) -> Option<Arc<dyn DatasetConnector>> {
        self.connectors.get(&source).cloned()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

/// Shared upstream client. `http_timeout` bounds each read rather than the
/// whole transfer, so large bulk downloads run as long as bytes keep arriving.
pub fn http_client(config: &DatasetConfig) -> reqwest::Result<Client> {
    Client::builder()
        .connect_timeout(config.http_timeout.min(MAX_CONNECT_TIMEOUT))
        .read_timeout(config.http_timeout)
        .user_agent(concat!("medcat/", env!("CARGO_PKG_VERSION")))
        .build()
}

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut sources: Vec<_> = self.connectors.keys().map(DatasetSource::as_str).collect();
        sources.sort_unstable();
        f.debug_struct("ConnectorRegistry")
            .field("sources", &sources)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_builtin_covers_every_source() {
        let registry = ConnectorRegistry::builtin(&DatasetConfig::default()).unwrap();
        assert_eq!(registry.len(), DatasetSource::ALL.len());
        assert!(registry.get(DatasetSource::Nhanes).is_some());
    }

    #[tokio::test]
    async fn test_client_times_out_stalled_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let mut config = DatasetConfig::default();
        config.http_timeout = Duration::from_millis(100);
        let client = http_client(&config).unwrap();

        let err = client
            .get(format!("{}/slow", server.uri()))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_timeout(), "{err}");

        let body = client
            .get(format!("{}/fast", server.uri()))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[test]
    fn test_empty_registry() {
        let registry = ConnectorRegistry::empty();
        assert!(registry.is_empty());
        assert!(registry.get(DatasetSource::OpenFda).is_none());
    }
}
