// exporter/src/main.rs

//! Exporter binary.
//!
//! Wires the `collector` crate into a running process:
//!
//! - environment configuration (optionally from a `.env` file),
//! - the Prometheus gauge registry,
//! - the seven collector tasks,
//! - the `/metrics` HTTP endpoint, until Ctrl-C.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;

use collector::{CollectorConfig, MetricsRegistry, register_all, run_prometheus_http_server};
use config::ExporterConfig;

#[tokio::main]
async fn main() {
    // A missing .env is fine: the variables may come from the real environment.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "exporter=info,collector=info".to_string()),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::info!("loaded environment from {}", path.display());
    }

    if let Err(e) = run().await {
        tracing::error!("fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let exporter_cfg = ExporterConfig::from_env().context("invalid exporter configuration")?;
    let collector_cfg = CollectorConfig::from_env().context("invalid collector configuration")?;

    // ---------------------------
    // Metrics registry
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().context("failed to initialise metrics registry")?,
    );

    // ---------------------------
    // Collector tasks
    // ---------------------------

    let tasks =
        register_all(&collector_cfg, &metrics).context("failed to start collector tasks")?;

    // ---------------------------
    // Metrics endpoint
    // ---------------------------

    let addr = exporter_cfg.listen_addr;
    tracing::info!("exporter listening on http://{}/metrics", addr);

    let result = tokio::select! {
        res = run_prometheus_http_server(metrics, addr) => {
            res.map_err(|e| anyhow::anyhow!("metrics HTTP server error on {addr}: {e}"))
        }
        _ = shutdown_signal() => Ok(()),
    };

    for task in tasks {
        task.abort();
    }
    result
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
