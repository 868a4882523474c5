//! Collector configuration.
//!
//! This module aggregates everything the collector tasks need to reach their
//! sources:
//!
//! - Ethereum JSON-RPC endpoints (remote and local node),
//! - the orchestrator addresses to monitor on both chains,
//! - the relay REST API and the GitHub release API,
//! - the `umeed` / `peggo` binaries,
//! - per-call timeouts.
//!
//! Values are read from the process environment with [`CollectorConfig::from_env`].
//! Tests go through [`CollectorConfig::from_lookup`] with an in-memory map.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_UMEED_BIN: &str = "/usr/local/bin/umeed";
pub const DEFAULT_PEGGO_BIN: &str = "/root/go/bin/peggo";
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration shared by all collector tasks.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Remote Ethereum JSON-RPC endpoint (`INFURA_WS`), HTTP(S) or WebSocket.
    pub remote_rpc_url: String,
    /// Local Ethereum JSON-RPC endpoint (`LOCAL_ETH_NODE_WS`).
    pub local_rpc_url: String,
    /// Orchestrator address on Ethereum, `0x`-prefixed.
    pub orchestrator_eth_address: String,
    /// Orchestrator address on the Umee chain.
    pub orchestrator_umee_address: String,
    /// Base URL of the Cosmos REST API used for relay synchronisation.
    pub relay_api_url: String,
    /// Base URL of the GitHub REST API.
    pub github_api_url: String,
    pub umeed_bin: String,
    pub peggo_bin: String,
    /// Timeout applied to every outbound HTTP request.
    pub http_timeout: Duration,
    /// Timeout applied to every subprocess invocation.
    pub command_timeout: Duration,
}

impl CollectorConfig {
    /// Loads the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let remote_rpc_url = rpc_url(&lookup, "INFURA_WS")?;
        let local_rpc_url = rpc_url(&lookup, "LOCAL_ETH_NODE_WS")?;

        let orchestrator_eth_address = required(&lookup, "ORCHESTRATOR_ETH_ADDRESS")?;
        validate_eth_address(&orchestrator_eth_address).map_err(|reason| {
            ConfigError::Invalid {
                var: "ORCHESTRATOR_ETH_ADDRESS",
                reason,
            }
        })?;

        let orchestrator_umee_address = required(&lookup, "ORCHESTRATOR_UMEE_ADDRESS")?;
        let relay_api_url = http_url(&lookup, "PEGGO_API")?;

        let github_api_url =
            optional(&lookup, "GITHUB_API").unwrap_or_else(|| DEFAULT_GITHUB_API.to_string());
        let umeed_bin =
            optional(&lookup, "UMEED_BIN").unwrap_or_else(|| DEFAULT_UMEED_BIN.to_string());
        let peggo_bin =
            optional(&lookup, "PEGGO_BIN").unwrap_or_else(|| DEFAULT_PEGGO_BIN.to_string());

        let http_timeout = secs(&lookup, "HTTP_TIMEOUT_SECS")?;
        let command_timeout = secs(&lookup, "COMMAND_TIMEOUT_SECS")?;

        Ok(Self {
            remote_rpc_url,
            local_rpc_url,
            orchestrator_eth_address,
            orchestrator_umee_address,
            relay_api_url,
            github_api_url,
            umeed_bin,
            peggo_bin,
            http_timeout,
            command_timeout,
        })
    }
}

/// Returns the trimmed value of `var`, treating empty strings as unset.
pub fn optional<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

fn http_url<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    url_with_scheme(lookup, var, &["http://", "https://"])
}

/// JSON-RPC endpoints may be either HTTP(S) or WebSocket URLs.
fn rpc_url<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    url_with_scheme(lookup, var, &["http://", "https://", "ws://", "wss://"])
}

fn url_with_scheme<F>(
    lookup: &F,
    var: &'static str,
    schemes: &[&str],
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let url = required(lookup, var)?;
    if !schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("expected a URL starting with {}, got {url:?}", schemes.join(" or ")),
        });
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn secs<F>(lookup: &F, var: &'static str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = optional(lookup, var) else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };
    let secs: u64 = raw.parse().map_err(|e| ConfigError::Invalid {
        var,
        reason: format!("{e}"),
    })?;
    if secs == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "timeout must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn validate_eth_address(addr: &str) -> Result<(), String> {
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .ok_or_else(|| "address must start with 0x".to_string())?;
    let bytes = hex::decode(digits).map_err(|e| format!("address is not hex: {e}"))?;
    if bytes.len() != 20 {
        return Err(format!("expected 20-byte address, got {} bytes", bytes.len()));
    }
    Ok(())
}
