//! Share monitor daemon
//!
//! Polls performance counters for the configured file shares, flags
//! statistical spikes and serves the inventory and active alerts over an
//! HTTP JSON API.

use anyhow::{Context, Result};
use sharewatch_lib::{
    api::{self, AppState},
    health::{components, HealthRegistry},
    sources::{
        AzureClientConfig, AzureFileShares, AzureMonitorMetrics, InventorySource, MetricsSource,
        UnconfiguredInventory, UnconfiguredMetrics,
    },
    AlertRegistry, InventoryView, MonitorMetrics, PollerBuilder, StructuredLogger,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the metrics and inventory providers, falling back to
/// placeholders that always fail when credentials are missing
fn build_sources(
    config: &config::MonitorConfig,
) -> Result<(Arc<dyn MetricsSource>, Arc<dyn InventorySource>)> {
    let Some(token) = config.token() else {
        warn!("No access token configured; metrics and inventory are unavailable");
        return Ok((
            Arc::new(UnconfiguredMetrics::new("SHAREWATCH_ACCESS_TOKEN is not set")),
            Arc::new(UnconfiguredInventory::new("SHAREWATCH_ACCESS_TOKEN is not set")),
        ));
    };

    let azure = AzureClientConfig::new(token).with_endpoint(config.management_endpoint.clone());
    let metrics: Arc<dyn MetricsSource> =
        Arc::new(AzureMonitorMetrics::new(&azure).context("Failed to create metrics client")?);

    let inventory: Arc<dyn InventorySource> = match &config.file_service_id {
        Some(id) => Arc::new(
            AzureFileShares::new(&azure, id.clone()).context("Failed to create inventory client")?,
        ),
        None => {
            warn!("No file service ID configured; share listing is unavailable");
            Arc::new(UnconfiguredInventory::new(
                "SHAREWATCH_FILE_SERVICE_ID is not set",
            ))
        }
    };

    Ok((metrics, inventory))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sharewatch");

    let config = config::MonitorConfig::load()?;
    let targets = config.targets();
    info!(
        shares = targets.len(),
        api_port = config.api_port,
        threshold = config.anomaly_threshold,
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::POLLER).await;
    health_registry.register(components::METRICS_SOURCE).await;

    let metrics = MonitorMetrics::new();
    let logger = StructuredLogger::new(
        std::env::var("HOSTNAME").unwrap_or_else(|_| "sharewatch".to_string()),
    );
    logger.log_startup(MONITOR_VERSION, targets.len());

    let registry = Arc::new(AlertRegistry::with_retention(config.alert_retention()));
    let (metrics_source, inventory_source) = build_sources(&config)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let poller_handle = if config.token().is_some() {
        let poller = PollerBuilder::new()
            .metrics_source(metrics_source.clone())
            .registry(registry.clone())
            .targets(targets.clone())
            .interval(config.poller_config().interval)
            .window_size(config.window_size)
            .threshold(config.anomaly_threshold)
            .health(health_registry.clone())
            .logger(logger.clone())
            .build()?;
        Some(tokio::spawn(poller.run(shutdown_tx.subscribe())))
    } else {
        health_registry
            .set_degraded(components::POLLER, "No access token configured")
            .await;
        logger.log_poller_exit("no access token configured");
        None
    };

    let inventory = InventoryView::new(inventory_source, metrics_source, targets);
    let app_state = Arc::new(AppState::new(
        registry,
        inventory,
        health_registry.clone(),
        metrics,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            // The listener only returns on failure; that is fatal
            let _ = shutdown_tx.send(());
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.context("API server failed")),
                Err(e) => Err(anyhow::Error::new(e).context("API server task panicked")),
            };
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    let _ = shutdown_tx.send(());
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    info!("Shutting down");

    Ok(())
}
