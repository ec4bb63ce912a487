//! Where the saorsa-node binary installed on the hosts comes from

use anyhow::{Context, bail};
use serde::Deserialize;
use std::fmt;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const GITHUB_REPO: &str = "saorsa-labs/saorsa-node";
pub const RELEASE_ASSET_NAME: &str = "saorsa-node-cli-linux-x64.tar.gz";

pub const BUILDS_BUCKET: &str = "saorsa-node-builds";
pub const BUILDS_REGION: &str = "eu-west-2";
pub const BUILDS_KEY_PREFIX: &str = "builds";

const USER_AGENT: &str = concat!("saorsa-deploy/", env!("CARGO_PKG_VERSION"));

/// Binary selection derived from the CLI flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySource {
    LatestRelease,
    Release(String),
    CustomBuild { owner: String, branch: String },
}

impl BinarySource {
    /// `--node-version` excludes `--repo-owner`/`--branch-name`, and the
    /// latter two only make sense together.
    pub fn from_flags(
        node_version: Option<&str>,
        repo_owner: Option<&str>,
        branch_name: Option<&str>,
    ) -> anyhow::Result<Self> {
        match (node_version, repo_owner, branch_name) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                bail!("--node-version cannot be used with --branch-name/--repo-owner")
            }
            (None, Some(_), None) | (None, None, Some(_)) => {
                bail!("--branch-name and --repo-owner must be used together")
            }
            (Some(version), None, None) => Ok(Self::Release(version.trim_start_matches('v').to_string())),
            (None, Some(owner), Some(branch)) => Ok(Self::CustomBuild {
                owner: owner.to_string(),
                branch: branch.to_string(),
            }),
            (None, None, None) => Ok(Self::LatestRelease),
        }
    }
}

impl fmt::Display for BinarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinarySource::LatestRelease => write!(f, "latest release"),
            BinarySource::Release(version) => write!(f, "release v{}", version),
            BinarySource::CustomBuild { owner, branch } => {
                write!(f, "custom build {}/saorsa-node ({})", owner, branch)
            }
        }
    }
}

/// A download the hosts can fetch directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBinary {
    pub url: String,

    /// Release assets are tarballs; custom builds are the raw executable
    pub archive: bool,
}

/// S3 key of a custom build
pub fn custom_build_key(owner: &str, branch: &str) -> String {
    format!("{}/{}/{}/saorsa-node", BUILDS_KEY_PREFIX, owner, branch)
}

pub fn custom_build_url(owner: &str, branch: &str) -> String {
    format!(
        "https://{}.s3.{}.amazonaws.com/{}",
        BUILDS_BUCKET,
        BUILDS_REGION,
        custom_build_key(owner, branch)
    )
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
}

/// Looks up release assets on GitHub and custom builds in the builds bucket
pub struct BinaryResolver {
    client: reqwest::Client,
    github_api: String,
    builds_base: Option<String>,
}

impl Default for BinaryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl BinaryResolver {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            github_api: GITHUB_API_BASE.to_string(),
            builds_base: None,
        }
    }

    pub fn with_github_api(mut self, base: impl Into<String>) -> Self {
        self.github_api = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Serve custom builds from `base` instead of the bucket's public URL
    pub fn with_builds_base(mut self, base: impl Into<String>) -> Self {
        self.builds_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    fn release_endpoint(&self, version: Option<&str>) -> String {
        match version {
            Some(v) => format!("{}/repos/{}/releases/tags/v{}", self.github_api, GITHUB_REPO, v),
            None => format!("{}/repos/{}/releases/latest", self.github_api, GITHUB_REPO),
        }
    }

    fn build_url(&self, owner: &str, branch: &str) -> String {
        match &self.builds_base {
            Some(base) => format!("{}/{}", base, custom_build_key(owner, branch)),
            None => custom_build_url(owner, branch),
        }
    }

    /// Download URL of the release asset; `None` means the latest release
    pub async fn release_url(&self, version: Option<&str>) -> anyhow::Result<String> {
        let endpoint = self.release_endpoint(version);
        tracing::debug!("GET {}", endpoint);

        let release: Release = self
            .client
            .get(&endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", endpoint))?
            .error_for_status()
            .with_context(|| format!("GitHub release lookup failed ({})", endpoint))?
            .json()
            .await
            .context("Unexpected GitHub release response")?;

        release
            .assets
            .into_iter()
            .find(|asset| asset.name == RELEASE_ASSET_NAME)
            .map(|asset| asset.browser_download_url)
            .with_context(|| {
                let tag = version.map_or_else(|| "latest".to_string(), |v| format!("v{}", v));
                format!(
                    "Could not find asset '{}' in {} release of {}",
                    RELEASE_ASSET_NAME, tag, GITHUB_REPO
                )
            })
    }

    pub async fn release_exists(&self, version: &str) -> anyhow::Result<bool> {
        let endpoint = self.release_endpoint(Some(version));
        let response = self
            .client
            .get(&endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", endpoint))?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    pub async fn custom_build_exists(&self, owner: &str, branch: &str) -> anyhow::Result<bool> {
        let url = self.build_url(owner, branch);
        tracing::debug!("HEAD {}", url);
        let response = self
            .client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("Failed to query {}", url))?;
        Ok(response.status().is_success())
    }

    /// Check the source exists and turn it into a download URL
    pub async fn resolve(&self, source: &BinarySource) -> anyhow::Result<ResolvedBinary> {
        match source {
            BinarySource::LatestRelease => Ok(ResolvedBinary {
                url: self.release_url(None).await?,
                archive: true,
            }),
            BinarySource::Release(version) => {
                if !self.release_exists(version).await? {
                    bail!("Release v{} not found on GitHub", version);
                }
                Ok(ResolvedBinary {
                    url: self.release_url(Some(version)).await?,
                    archive: true,
                })
            }
            BinarySource::CustomBuild { owner, branch } => {
                if !self.custom_build_exists(owner, branch).await? {
                    bail!(
                        "No custom build found for {}/{}. Run 'build-saorsa-node-binary' first.",
                        owner,
                        branch
                    );
                }
                Ok(ResolvedBinary {
                    url: self.build_url(owner, branch),
                    archive: false,
                })
            }
        }
    }
}
