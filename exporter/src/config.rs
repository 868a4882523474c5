//! Exporter configuration.
//!
//! Only the HTTP listen address lives here; everything the collector tasks
//! need is in `collector::CollectorConfig`.

use std::env;
use std::net::{IpAddr, SocketAddr};

use collector::ConfigError;
use collector::config::{optional, required};

pub const DEFAULT_SERVER_IP: &str = "0.0.0.0";

/// Configuration for the `/metrics` HTTP server.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Address to bind the HTTP server to (`SERVER_IP:EXPORTER_PORT`).
    pub listen_addr: SocketAddr,
}

impl ExporterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = required(&lookup, "EXPORTER_PORT")?
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "EXPORTER_PORT",
                reason: format!("{e}"),
            })?;

        let ip: IpAddr = optional(&lookup, "SERVER_IP")
            .unwrap_or_else(|| DEFAULT_SERVER_IP.to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "SERVER_IP",
                reason: format!("{e}"),
            })?;

        Ok(Self {
            listen_addr: SocketAddr::new(ip, port),
        })
    }
}
