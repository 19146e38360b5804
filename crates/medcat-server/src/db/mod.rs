//! Database bootstrap
//!
//! Pool creation, migrations, and the choice between the PostgreSQL and the
//! in-memory snapshot ledger.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::ingest::{InMemoryLedger, PgLedger, SnapshotLedger};

pub async fn create_pool(url: &str, config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .context("Failed to run migrations")?;

    tracing::info!("Database migrations completed");
    Ok(())
}

/// PostgreSQL ledger when a database URL is configured, in-memory otherwise
pub async fn open_ledger(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn SnapshotLedger>> {
    match &config.url {
        Some(url) => {
            let pool = create_pool(url, config)
                .await
                .context("Failed to connect to the database")?;
            run_migrations(&pool).await?;
            Ok(Arc::new(PgLedger::new(pool)))
        },
        None => {
            tracing::warn!(
                "DATABASE_URL is not set; using an in-memory snapshot ledger, history is lost on restart"
            );
            Ok(Arc::new(InMemoryLedger::new()))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn test_without_url_uses_memory_ledger() {
        let config = Config::default();
        let ledger = open_ledger(&config.database).await.unwrap();
        assert!(ledger.ping().await.is_ok());
        assert!(ledger.list_sources().await.unwrap().is_empty());
    }
}
