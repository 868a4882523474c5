//! Subprocess-backed sources.
//!
//! The `umeed` and `peggo` binaries are invoked directly (no shell) with
//! fixed argument templates; JSON output is decoded in-process.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{MICRO_DECIMALS, Source, scale_down};
use crate::error::SourceError;

/// Which stream of a finished command carries the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    /// Value on stdout; any stderr output fails the call.
    Stdout,
    /// Value on stdout, or on stderr when stdout is blank. Some Cosmos SDK
    /// binaries print their version to stderr.
    StdoutOrStderr,
}

/// Runs commands with a timeout and turns failures into [`SourceError`]s.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Runs `program args..` to completion and returns the selected output.
    ///
    /// The child is killed if it outlives the timeout.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        stream: OutputStream,
    ) -> Result<String, SourceError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                SourceError::Command(format!(
                    "{program} timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| SourceError::Command(format!("failed to run {program}: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(SourceError::Command(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        match stream {
            OutputStream::Stdout if !stderr.trim().is_empty() => Err(SourceError::Command(
                format!("{program} wrote to stderr: {}", stderr.trim()),
            )),
            OutputStream::Stdout => Ok(stdout),
            OutputStream::StdoutOrStderr if stdout.trim().is_empty() => Ok(stderr),
            OutputStream::StdoutOrStderr => Ok(stdout),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BankBalances {
    balances: Vec<Coin>,
}

#[derive(Debug, Deserialize)]
struct Coin {
    amount: String,
}

/// Extracts `.balances[0].amount` from `q bank balances --output json`.
fn parse_first_balance(json: &str) -> Result<u128, SourceError> {
    let parsed: BankBalances = serde_json::from_str(json)
        .map_err(|e| SourceError::Data(format!("malformed bank balances output: {e}")))?;
    let coin = parsed
        .balances
        .first()
        .ok_or_else(|| SourceError::Data("account has no balances".to_string()))?;
    coin.amount
        .trim()
        .parse()
        .map_err(|e| SourceError::Data(format!("balance {:?} is not an integer: {e}", coin.amount)))
}

/// Orchestrator balance on the native chain, converted from micro-units.
pub struct NativeBalance {
    runner: CommandRunner,
    bin: String,
    address: String,
}

impl NativeBalance {
    pub fn new(runner: CommandRunner, bin: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            runner,
            bin: bin.into(),
            address: address.into(),
        }
    }
}

#[async_trait]
impl Source for NativeBalance {
    async fn fetch(&self) -> Result<f64, SourceError> {
        let out = self
            .runner
            .run(
                &self.bin,
                &["q", "bank", "balances", self.address.as_str(), "--output", "json"],
                OutputStream::Stdout,
            )
            .await?;
        Ok(scale_down(parse_first_balance(&out)?, MICRO_DECIMALS))
    }
}

/// How a binary reports its version.
#[derive(Clone, Debug)]
pub enum VersionCommand {
    /// `<bin> version`, plain text on stdout or stderr.
    Plain { bin: String },
    /// `<bin> version --format json`, `.version` on stdout.
    Json { bin: String },
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: String,
}

fn parse_json_version(out: &str) -> Result<String, serde_json::Error> {
    let info: VersionInfo = serde_json::from_str(out)?;
    Ok(info.version.trim().to_string())
}

impl VersionCommand {
    /// Queries the local binary for its version string.
    pub async fn query(&self, runner: &CommandRunner) -> Result<String, SourceError> {
        match self {
            VersionCommand::Plain { bin } => {
                let out = runner
                    .run(bin, &["version"], OutputStream::StdoutOrStderr)
                    .await?;
                let version = out.trim();
                if version.is_empty() {
                    return Err(SourceError::Data(format!("{bin} printed no version")));
                }
                Ok(version.to_string())
            }
            VersionCommand::Json { bin } => {
                let out = runner
                    .run(bin, &["version", "--format", "json"], OutputStream::Stdout)
                    .await?;
                parse_json_version(&out)
                    .map_err(|e| SourceError::Data(format!("malformed {bin} version output: {e}")))
            }
        }
    }
}
