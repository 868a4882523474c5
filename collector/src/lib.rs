//! Collector library crate.
//!
//! This crate provides the building blocks of the Peggo orchestrator
//! exporter:
//!
//! - collector configuration loaded from the environment (`config`),
//! - the error taxonomy shared by all sources (`error`),
//! - the Prometheus gauge registry and `/metrics` endpoint (`metrics`),
//! - fetch procedures for every external source (`sources`),
//! - the generic collector task and the task table (`tasks`).
//!
//! The `exporter` binary composes these pieces: it builds a
//! [`MetricsRegistry`], starts the tasks with [`register_all`] and serves
//! the registry with [`run_prometheus_http_server`].

pub mod config;
pub mod error;
pub mod metrics;
pub mod sources;
pub mod tasks;

pub use config::CollectorConfig;
pub use error::{ConfigError, SourceError};
pub use metrics::{ExporterMetrics, MetricsRegistry, run_prometheus_http_server, serve};
pub use sources::Source;
pub use tasks::{CollectorTask, FailurePolicy, PollOutcome, build_tasks, register_all};
