//! Prometheus-backed gauges and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the exporter gauges, and an async HTTP exporter that
//! serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode,
    body::Incoming,
    header::{self, HeaderValue},
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{self, Encoder, Gauge, Opts, Registry, TEXT_FORMAT, TextEncoder};

/// The gauges published by the exporter, one per collector task.
///
/// Each gauge has exactly one writer: the collector task that owns it.
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Block height reported by the local Ethereum node.
    pub local_eth_block_height: Gauge,
    /// Block height reported by the remote Ethereum node.
    pub eth_block_height: Gauge,
    /// Orchestrator balance on Ethereum, in ether.
    pub orchestrator_eth_balance: Gauge,
    /// Orchestrator balance on the Umee chain, in whole units.
    pub orchestrator_umee_balance: Gauge,
    /// 1 when the local `umeed` matches the latest release, 0 otherwise.
    pub umee_version: Gauge,
    /// 1 when the local `peggo` matches the latest release, 0 otherwise.
    pub peggo_version: Gauge,
    /// Event nonce gap between the most advanced orchestrator and ours.
    ///
    /// 10000 when the lag could not be computed.
    pub peggo_sync: Gauge,
}

impl ExporterMetrics {
    /// Registers the exporter gauges into the given `Registry`.
    ///
    /// Fails if any of the names is already registered.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            local_eth_block_height: register_gauge(
                registry,
                "local_eth_block_height",
                "Local node block height",
            )?,
            eth_block_height: register_gauge(
                registry,
                "eth_block_height",
                "External node block height",
            )?,
            orchestrator_eth_balance: register_gauge(
                registry,
                "orchestrator_eth_balance",
                "Orchestrator ETH balance",
            )?,
            orchestrator_umee_balance: register_gauge(
                registry,
                "orchestrator_umee_balance",
                "Orchestrator umee balance",
            )?,
            umee_version: register_gauge(registry, "umee_version", "umeed version")?,
            peggo_version: register_gauge(registry, "peggo_version", "peggo version")?,
            peggo_sync: register_gauge(registry, "peggo_sync", "Peggo checker")?,
        })
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Wrapper around a Prometheus registry and the exporter gauges.
///
/// This is the main handle passed to collector tasks and to the HTTP
/// exporter. It can be wrapped in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub exporter: ExporterMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the exporter gauges.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let exporter = ExporterMetrics::register(&registry)?;
        Ok(Self { registry, exporter })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    ///
    /// Metric families are sorted by name, so the output is deterministic
    /// for a given set of values.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics on `addr`.
///
/// See [`serve`] for the routes.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, metrics).await
}

/// Serves the exporter routes on an already-bound listener.
///
/// - `GET /metrics`: Prometheus text exposition format,
/// - `GET /health`: `{"status":"ok"}`,
/// - anything else: 404.
///
/// Each connection is handled on its own task, so a scrape never waits on
/// a collector task.
pub async fn serve(
    listener: TcpListener,
    metrics: Arc<MetricsRegistry>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req: Request<Incoming>| {
                let metrics = metrics.clone();
                async move { Ok::<_, Infallible>(route(&req, &metrics)) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::debug!(%peer, "metrics HTTP connection error: {err}");
            }
        });
    }
}

fn route<B>(req: &Request<B>, metrics: &MetricsRegistry) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(StatusCode::OK, TEXT_FORMAT, metrics.gather_text()),
        (&Method::GET, "/health") => respond(
            StatusCode::OK,
            "application/json",
            serde_json::json!({ "status": "ok" }).to_string(),
        ),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}
