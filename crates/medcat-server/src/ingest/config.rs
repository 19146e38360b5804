//! Ingestion configuration
//!
//! Read from `DATASET_*` environment variables. Per-source endpoint overrides
//! follow the pattern `DATASET_<KEY>_BASE_URL`, `DATASET_<KEY>_DOWNLOAD_URL`
//! and `DATASET_<KEY>_API_KEY`, where `<KEY>` is the upper-cased
//! [`DatasetSource::config_key`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::sources::DatasetSource;

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_STORAGE_DIR: &str = "./storage/datasets";
pub const DEFAULT_TEMP_DIR: &str = "./storage/tmp";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 5000;
/// Daily at 03:00
pub const DEFAULT_CRON_EXPRESSION: &str = "0 3 * * *";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 300;

pub const MIN_RETRIES: u32 = 1;
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub storage_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Attempts per invocation, including the first
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub cron_expression: String,
    /// Raw names as configured; resolved by the scheduler
    pub scheduled_sources: Vec<String>,
    pub http_timeout: Duration,
    overrides: HashMap<String, String>,
}

impl DatasetConfig {
    /// Load from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load from an explicit set of variables. Unrelated variables are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, _)| k.starts_with("DATASET_"))
            .collect();

        let get = |key: &str| lookup(&vars, key);

        let max_retries = match get("DATASET_MAX_RETRIES") {
            Some(raw) => raw
                .parse()
                .map_err(|_| anyhow::anyhow!("DATASET_MAX_RETRIES must be an integer, got '{raw}'"))?,
            None => DEFAULT_MAX_RETRIES,
        };

        let retry_backoff_ms = match get("DATASET_RETRY_BACKOFF_MS") {
            Some(raw) => raw.parse().map_err(|_| {
                anyhow::anyhow!("DATASET_RETRY_BACKOFF_MS must be an integer, got '{raw}'")
            })?,
            None => DEFAULT_RETRY_BACKOFF_MS,
        };

        let http_timeout_secs = match get("DATASET_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse().map_err(|_| {
                anyhow::anyhow!("DATASET_HTTP_TIMEOUT_SECS must be an integer, got '{raw}'")
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let storage_dir = PathBuf::from(get("DATASET_STORAGE_DIR").unwrap_or(DEFAULT_STORAGE_DIR));
        let temp_dir = PathBuf::from(get("DATASET_TEMP_DIR").unwrap_or(DEFAULT_TEMP_DIR));
        let cron_expression = get("DATASET_CRON_EXPRESSION")
            .unwrap_or(DEFAULT_CRON_EXPRESSION)
            .to_string();
        let scheduled_sources = get("DATASET_SCHEDULED_SOURCES")
            .map(parse_source_list)
            .unwrap_or_default();

        let config = Self {
            storage_dir,
            temp_dir,
            max_retries,
            retry_backoff: Duration::from_millis(retry_backoff_ms),
            cron_expression,
            scheduled_sources,
            http_timeout: Duration::from_secs(http_timeout_secs),
            overrides: vars,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_RETRIES..=MAX_RETRIES).contains(&self.max_retries) {
            anyhow::bail!(
                "DATASET_MAX_RETRIES must be between {} and {}, got {}",
                MIN_RETRIES,
                MAX_RETRIES,
                self.max_retries
            );
        }

        if self.retry_backoff.is_zero() {
            anyhow::bail!("DATASET_RETRY_BACKOFF_MS must be greater than 0");
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("DATASET_HTTP_TIMEOUT_SECS must be greater than 0");
        }

        if self.cron_expression.split_whitespace().count() < 5 {
            anyhow::bail!("Invalid DATASET_CRON_EXPRESSION '{}'", self.cron_expression);
        }

        Ok(())
    }

    pub fn base_url(&self, source: DatasetSource, fallback: &str) -> String {
        self.source_override(source, "BASE_URL")
            .unwrap_or(fallback)
            .to_string()
    }

    pub fn download_url(&self, source: DatasetSource, fallback: &str) -> String {
        self.source_override(source, "DOWNLOAD_URL")
            .unwrap_or(fallback)
            .to_string()
    }

    /// Explicitly configured download URL, without a fallback
    pub fn download_override(&self, source: DatasetSource) -> Option<&str> {
        self.source_override(source, "DOWNLOAD_URL")
    }

    pub fn api_key(&self, source: DatasetSource) -> Option<String> {
        self.source_override(source, "API_KEY").map(str::to_string)
    }

    /// Builder-style override, mostly for pointing connectors at a mock upstream
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    fn source_override(&self, source: DatasetSource, suffix: &str) -> Option<&str> {
        let key = format!("DATASET_{}_{}", source.config_key().to_uppercase(), suffix);
        lookup(&self.overrides, &key)
    }
}

fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            temp_dir: PathBuf::from(DEFAULT_TEMP_DIR),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            cron_expression: DEFAULT_CRON_EXPRESSION.to_string(),
            scheduled_sources: Vec::new(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            overrides: HashMap::new(),
        }
    }
}

fn parse_source_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
