//! MedCat Server - Main entry point

use anyhow::Result;
use medcat_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

use medcat_server::{
    api::{self, AppState},
    config::Config,
    db,
    ingest::{self, ConnectorRegistry, DatasetConfig, DatasetScheduler, IngestOrchestrator},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("medcat-server")
        .filter_directives("medcat_server=debug,tower_http=debug,sqlx=info")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    init_logging(&log_config)?;

    info!("Starting MedCat Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let dataset_config = DatasetConfig::from_env()?;

    let ledger = db::open_ledger(&config.database).await?;
    ingest::register_sources(&ledger).await?;

    let registry = Arc::new(ConnectorRegistry::builtin(&dataset_config)?);
    info!(connectors = registry.len(), "Connector registry built");

    let shutdown = CancellationToken::new();
    let orchestrator = Arc::new(IngestOrchestrator::new(
        dataset_config,
        registry,
        ledger.clone(),
        shutdown.clone(),
    ));

    let scheduler = DatasetScheduler::new(orchestrator.clone(), orchestrator.config());
    let mut cron = scheduler.start().await?;

    let app = api::create_router(
        AppState {
            ledger,
            orchestrator,
        },
        &config.cors,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            config.server.shutdown_timeout_secs,
            shutdown.clone(),
        ))
        .await?;

    if let Some(sched) = cron.as_mut() {
        if let Err(e) = sched.shutdown().await {
            tracing::error!("Failed to stop dataset scheduler: {}", e);
        }
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels in-flight ingestions
async fn shutdown_signal(timeout_secs: u64, shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    shutdown.cancel();

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
