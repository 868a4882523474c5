//! External sources polled by the collector tasks.
//!
//! Every source implements [`Source`]: one async fetch that yields the
//! gauge value in its final unit (blocks, ether, whole tokens, 0/1 flag,
//! nonce gap). Sources never touch gauges themselves; applying the value
//! or the failure policy is the job of [`crate::tasks::CollectorTask`].
//!
//! - [`eth_rpc`]: Ethereum JSON-RPC (block height, ETH balance),
//! - [`cli`]: subprocess queries (`umeed` balance, local binary versions),
//! - [`release`]: GitHub latest-release lookups and version matching,
//! - [`relay`]: relay API fan-out computing the event nonce lag.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::SourceError;

pub mod cli;
pub mod eth_rpc;
pub mod release;
pub mod relay;

pub use cli::{CommandRunner, NativeBalance, OutputStream, VersionCommand};
pub use eth_rpc::{BlockHeight, EthBalance, EthRpcClient};
pub use release::{GithubReleases, VersionMatch};
pub use relay::{RelayApi, RelaySync};

/// A fallible external reading converted to a gauge value.
#[async_trait]
pub trait Source: Send + Sync {
    async fn fetch(&self) -> Result<f64, SourceError>;
}

/// Decimals of one ether expressed in wei.
pub const WEI_DECIMALS: u32 = 18;
/// Decimals of one native token expressed in micro-units.
pub const MICRO_DECIMALS: u32 = 6;

/// Shifts an integer amount `decimals` places to the right.
///
/// The integer and fractional parts are converted separately so that whole
/// amounts (e.g. exactly one ether) come out exact.
pub fn scale_down(amount: u128, decimals: u32) -> f64 {
    let unit = 10u128.pow(decimals);
    let whole = amount / unit;
    let frac = amount % unit;
    whole as f64 + frac as f64 / unit as f64
}

/// Builds the shared async HTTP client used by all HTTP-backed sources.
pub fn http_client(timeout: Duration) -> Result<Client, SourceError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("peggo-exporter/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SourceError::Transport(format!("failed to build HTTP client: {e}")))
}

/// Joins a base URL and a path without doubling or dropping slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Fails with [`SourceError::Transport`] unless the response is 2xx.
pub(crate) fn ensure_success(
    resp: reqwest::Response,
    url: &str,
) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(SourceError::Transport(format!(
            "{url} returned HTTP status {status}"
        )));
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_ether_in_wei_is_exactly_one() {
        assert_eq!(scale_down(1_000_000_000_000_000_000, WEI_DECIMALS), 1.0);
    }

    #[test]
    fn micro_units_keep_their_fraction() {
        assert_eq!(scale_down(2_500_000, MICRO_DECIMALS), 2.5);
        assert_eq!(scale_down(0, MICRO_DECIMALS), 0.0);
        assert_eq!(scale_down(1, MICRO_DECIMALS), 0.000001);
    }

    #[test]
    fn endpoint_avoids_double_slashes() {
        assert_eq!(
            endpoint("http://api:1317/", "/cosmos/staking"),
            "http://api:1317/cosmos/staking"
        );
        assert_eq!(endpoint("http://api:1317", "x"), "http://api:1317/x");
    }
}
