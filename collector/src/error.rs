use thiserror::Error;

/// Errors that can occur while fetching a reading from an external source.
///
/// None of these are fatal: a collector task logs the error and applies its
/// failure policy (keep the last value or write a fallback).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport-level error (connection refused, timeout, non-2xx status).
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// A subprocess could not be spawned, exited non-zero or wrote to stderr.
    #[error("command error: {0}")]
    Command(String),
    /// The response was reachable but did not have the expected shape.
    #[error("unexpected data: {0}")]
    Data(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Data(format!("failed to decode response body: {e}"))
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

/// Configuration errors raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}
