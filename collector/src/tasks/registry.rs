//! The exporter's task table: which source feeds which gauge, how often,
//! and what happens on failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::collector::{CollectorTask, FailurePolicy};
use crate::config::CollectorConfig;
use crate::error::SourceError;
use crate::metrics::MetricsRegistry;
use crate::sources::{
    BlockHeight, CommandRunner, EthBalance, EthRpcClient, GithubReleases, NativeBalance, RelayApi,
    RelaySync, VersionCommand, VersionMatch, http_client,
};

pub const BLOCK_HEIGHT_INTERVAL: Duration = Duration::from_secs(120);
pub const BALANCE_INTERVAL: Duration = Duration::from_secs(300);
pub const VERSION_INTERVAL: Duration = Duration::from_secs(300);
pub const RELAY_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Value of `peggo_sync` when the lag cannot be computed.
pub const RELAY_SYNC_SENTINEL: f64 = 10_000.0;
/// Value of the version gauges when the check cannot be completed.
pub const VERSION_FALLBACK: f64 = 0.0;

pub const UMEE_REPO: &str = "umee-network/umee";
pub const PEGGO_REPO: &str = "umee-network/peggo";

/// Builds the seven collector tasks without starting them.
pub fn build_tasks(
    cfg: &CollectorConfig,
    metrics: &MetricsRegistry,
) -> Result<Vec<CollectorTask>, SourceError> {
    let http = http_client(cfg.http_timeout)?;
    let runner = CommandRunner::new(cfg.command_timeout);
    let gauges = &metrics.exporter;

    let local_node = Arc::new(EthRpcClient::for_url(
        cfg.local_rpc_url.clone(),
        http.clone(),
        cfg.http_timeout,
    ));
    let remote_node = Arc::new(EthRpcClient::for_url(
        cfg.remote_rpc_url.clone(),
        http.clone(),
        cfg.http_timeout,
    ));
    let releases = Arc::new(GithubReleases::new(cfg.github_api_url.clone(), http.clone()));

    Ok(vec![
        CollectorTask::new(
            "local_eth_block_height",
            gauges.local_eth_block_height.clone(),
            BLOCK_HEIGHT_INTERVAL,
            Arc::new(BlockHeight::new(local_node)),
            FailurePolicy::KeepLast,
        ),
        CollectorTask::new(
            "eth_block_height",
            gauges.eth_block_height.clone(),
            BLOCK_HEIGHT_INTERVAL,
            Arc::new(BlockHeight::new(remote_node.clone())),
            FailurePolicy::KeepLast,
        ),
        CollectorTask::new(
            "orchestrator_eth_balance",
            gauges.orchestrator_eth_balance.clone(),
            BALANCE_INTERVAL,
            Arc::new(EthBalance::new(
                remote_node,
                cfg.orchestrator_eth_address.clone(),
            )),
            FailurePolicy::KeepLast,
        ),
        CollectorTask::new(
            "orchestrator_umee_balance",
            gauges.orchestrator_umee_balance.clone(),
            BALANCE_INTERVAL,
            Arc::new(NativeBalance::new(
                runner.clone(),
                cfg.umeed_bin.clone(),
                cfg.orchestrator_umee_address.clone(),
            )),
            FailurePolicy::KeepLast,
        ),
        CollectorTask::new(
            "umee_version",
            gauges.umee_version.clone(),
            VERSION_INTERVAL,
            Arc::new(VersionMatch::new(
                runner.clone(),
                VersionCommand::Plain {
                    bin: cfg.umeed_bin.clone(),
                },
                releases.clone(),
                UMEE_REPO,
            )),
            FailurePolicy::Fallback(VERSION_FALLBACK),
        ),
        CollectorTask::new(
            "peggo_version",
            gauges.peggo_version.clone(),
            VERSION_INTERVAL,
            Arc::new(VersionMatch::new(
                runner,
                VersionCommand::Json {
                    bin: cfg.peggo_bin.clone(),
                },
                releases,
                PEGGO_REPO,
            )),
            FailurePolicy::Fallback(VERSION_FALLBACK),
        ),
        CollectorTask::new(
            "peggo_sync",
            gauges.peggo_sync.clone(),
            RELAY_SYNC_INTERVAL,
            Arc::new(RelaySync::new(
                RelayApi::new(cfg.relay_api_url.clone(), http),
                cfg.orchestrator_umee_address.clone(),
            )),
            FailurePolicy::Fallback(RELAY_SYNC_SENTINEL),
        ),
    ])
}

/// Builds and starts every collector task on the current Tokio runtime.
pub fn register_all(
    cfg: &CollectorConfig,
    metrics: &MetricsRegistry,
) -> Result<Vec<JoinHandle<()>>, SourceError> {
    let tasks = build_tasks(cfg, metrics)?;
    tracing::info!(count = tasks.len(), "starting collector tasks");
    Ok(tasks.into_iter().map(CollectorTask::spawn).collect())
}
