//! Collector tasks.
//!
//! - [`collector::CollectorTask`]: one gauge, one source, one timer,
//! - [`registry`]: the table wiring the seven exporter gauges to their
//!   sources, intervals and failure policies.

pub mod collector;
pub mod registry;

pub use collector::{CollectorTask, FailurePolicy, PollOutcome};
pub use registry::{RELAY_SYNC_SENTINEL, build_tasks, register_all};
