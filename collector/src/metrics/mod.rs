//! Gauge registry and Prometheus exporter.
//!
//! This module defines the seven gauges published by the exporter and a
//! small HTTP server that serves `/metrics` in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! use collector::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! let addr: SocketAddr = "0.0.0.0:9300".parse()?;
//!
//! tokio::spawn(run_prometheus_http_server(registry.clone(), addr));
//!
//! // Elsewhere, from the owning collector task:
//! registry.exporter.peggo_sync.set(2.0);
//! ```

pub mod prometheus;

pub use prometheus::{ExporterMetrics, MetricsRegistry, run_prometheus_http_server, serve};
