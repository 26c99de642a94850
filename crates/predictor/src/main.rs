//! Rent predictor - apartment rent estimation service
//!
//! Loads (or builds on first start) the rent model and serves predictions,
//! health and metrics over HTTP.

use anyhow::{Context, Result};
use predictor_lib::{HealthRegistry, PredictionService, PredictorConfig, StructuredLogger};
use rent_predictor::{api, lifecycle};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let config = PredictorConfig::load().context("failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(fmt::layer().json())
        .init();

    info!(
        artifact = %config.artifact_path().display(),
        data_source = ?config.data_source,
        "Predictor configured"
    );

    let health_registry = HealthRegistry::new();
    lifecycle::register_components(&health_registry).await;

    let logger = StructuredLogger::new(config.model_name.clone());
    let port = config.server.port;
    let service = Arc::new(PredictionService::new(config, logger.clone()));
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), service.clone()));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut api_handle = tokio::spawn(api::serve(port, app_state, async move {
        let _ = stop_rx.await;
    }));
    logger.log_startup(SERVICE_VERSION, port);

    if let Err(e) = lifecycle::load_model(&service, &health_registry).await {
        logger.log_shutdown("model load failed");
        let _ = stop_tx.send(());
        let _ = api_handle.await;
        return Err(e).context("model is not available");
    }

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
            let _ = stop_tx.send(());
            api_handle.await.context("API server task panicked")??;
        }
        served = &mut api_handle => {
            logger.log_shutdown("API server stopped");
            served.context("API server task panicked")??;
        }
    }
    info!("Shutdown complete");

    Ok(())
}
