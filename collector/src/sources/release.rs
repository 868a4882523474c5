//! Latest-release lookups and the version-match source.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::Deserialize;

use super::cli::{CommandRunner, VersionCommand};
use super::{Source, endpoint, ensure_success};
use crate::error::SourceError;

/// Client for the GitHub releases API.
pub struct GithubReleases {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

impl GithubReleases {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Tag of the latest release of `repo` (`owner/name`).
    pub async fn latest_tag(&self, repo: &str) -> Result<String, SourceError> {
        let url = endpoint(&self.base_url, &format!("repos/{repo}/releases/latest"));
        let resp = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| SourceError::Transport(format!("GET {url} failed: {e}")))?;
        let release: Release = ensure_success(resp, &url)?.json().await?;
        Ok(release.tag_name)
    }
}

/// Compares a local version string with a release tag, ignoring surrounding
/// whitespace only.
///
/// The strings must otherwise be identical: `1.2.3` does not match `v1.2.3`.
pub fn versions_match(local: &str, release_tag: &str) -> bool {
    let local = local.trim();
    !local.is_empty() && local == release_tag.trim()
}

/// 1 when the local binary runs the latest released version, 0 otherwise.
pub struct VersionMatch {
    runner: CommandRunner,
    local: VersionCommand,
    releases: Arc<GithubReleases>,
    repo: String,
}

impl VersionMatch {
    pub fn new(
        runner: CommandRunner,
        local: VersionCommand,
        releases: Arc<GithubReleases>,
        repo: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            local,
            releases,
            repo: repo.into(),
        }
    }
}

#[async_trait]
impl Source for VersionMatch {
    async fn fetch(&self) -> Result<f64, SourceError> {
        let local = self.local.query(&self.runner).await?;
        let latest = self.releases.latest_tag(&self.repo).await?;

        if versions_match(&local, &latest) {
            Ok(1.0)
        } else {
            tracing::info!(repo = %self.repo, %local, %latest, "local binary is not the latest release");
            Ok(0.0)
        }
    }
}
