use anyhow::{Context, Result};
use asset_storage_service::api::{start_api_server, AppState};
use asset_storage_service::{Config, PlaceholderGenerator, S3Backend, StorageGateway};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before reading configuration
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    info!(
        service = %config.service.name,
        bucket = %config.s3.bucket,
        url_mode = ?config.s3.url_mode,
        "Starting Asset Storage Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let backend = S3Backend::new(&config.s3)
        .await
        .context("Failed to initialize S3 backend")?;

    let state = AppState {
        gateway: Arc::new(StorageGateway::new(Arc::new(backend), &config.s3)),
        generator: Arc::new(PlaceholderGenerator::new(config.generation.clone())),
    };

    if let Err(e) = state.gateway.check_bucket().await {
        warn!(error = %e, "Bucket check failed at startup; serving anyway");
    }

    start_api_server(state, &config.api, shutdown_signal()).await?;

    info!("Asset storage service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }

    info!("Shutting down asset storage service");
}
