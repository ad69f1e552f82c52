//! Monitoring Daemon - Main Entry Point

use anyhow::Context;
use monitor::{init_logging, install_metrics_exporter, MonitorConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "monitor.toml".to_string());
    let config = MonitorConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {path}"))?;

    init_logging(&config.logging);

    info!("=== Incident Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from {}", path);

    if let Some(addr) = &config.metrics_addr {
        install_metrics_exporter(addr)?;
    }

    let monitor = monitor::start(&config)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    monitor.shutdown().await;
    Ok(())
}
