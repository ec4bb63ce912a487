pub mod build;
pub mod destroy;
pub mod infra;
pub mod provision;
pub mod provision_genesis;

use crate::binary_source::{BinaryResolver, BinarySource};
use crate::remote::{IpVersion, ServiceParams};
use crate::utils;
use clap::Args;
use colored::Colorize;
use saorsa_cloud::{
    ApplyConfiguration, DeploymentStateStore, FileStateBackend, ProviderCatalog, RegionPair,
};
use saorsa_config::StateBackendSettings;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Options shared by the commands that install saorsa-node services
#[derive(Args, Debug, Clone)]
pub struct NodeServiceArgs {
    /// SSH key used to log in as root
    #[arg(long, default_value = "~/.ssh/id_rsa")]
    pub ssh_key_path: PathBuf,

    /// IP version the nodes run with
    #[arg(long, value_enum)]
    pub ip_version: Option<IpVersion>,

    /// Log level the nodes run with
    #[arg(long)]
    pub log_level: Option<String>,

    /// Run the nodes with --network-mode testnet
    #[arg(long)]
    pub testnet: bool,

    /// Release version to deploy (e.g. 0.2.0); latest release when omitted
    #[arg(long, conflicts_with_all = ["repo_owner", "branch_name"])]
    pub node_version: Option<String>,

    /// GitHub owner of a custom build (requires --branch-name)
    #[arg(long)]
    pub repo_owner: Option<String>,

    /// Branch of a custom build (requires --repo-owner)
    #[arg(long)]
    pub branch_name: Option<String>,
}

impl NodeServiceArgs {
    pub fn binary_source(&self) -> anyhow::Result<BinarySource> {
        BinarySource::from_flags(
            self.node_version.as_deref(),
            self.repo_owner.as_deref(),
            self.branch_name.as_deref(),
        )
    }

    pub fn ssh_key(&self) -> PathBuf {
        utils::expand_home(&self.ssh_key_path)
    }

    /// Check the binary exists and assemble the service settings
    pub async fn resolve(&self, resolver: &BinaryResolver) -> anyhow::Result<ServiceParams> {
        let source = self.binary_source()?;
        println!("Checking {}...", source);
        let binary = resolver.resolve(&source).await?;
        println!("  Using binary: {}", binary.url.cyan());

        Ok(ServiceParams {
            binary,
            ip_version: self.ip_version.unwrap_or_default(),
            log_level: self.log_level.clone(),
            testnet: self.testnet,
        })
    }

    pub fn print_summary(&self) {
        println!("  SSH key: {}", self.ssh_key_path.display());
        if let Some(version) = self.ip_version {
            println!("  IP version: {}", version);
        }
        if let Some(level) = &self.log_level {
            println!("  Log level: {}", level);
        }
        if self.testnet {
            println!("  Testnet mode: enabled");
        }
    }
}

/// Open the deployment record store selected by the environment
pub async fn open_state_store() -> anyhow::Result<DeploymentStateStore> {
    let settings = StateBackendSettings::from_env();
    tracing::debug!("State backend: {:?}", settings);

    match settings {
        StateBackendSettings::File { root } => Ok(DeploymentStateStore::new(Arc::new(
            FileStateBackend::new(root),
        ))),
        #[cfg(feature = "s3-state")]
        StateBackendSettings::S3 { bucket, region } => Ok(DeploymentStateStore::new(Arc::new(
            saorsa_cloud_aws::S3StateBackend::new(bucket, region).await,
        ))),
        #[cfg(not(feature = "s3-state"))]
        StateBackendSettings::S3 { .. } => anyhow::bail!(
            "This build has no S3 support; set SAORSA_STATE_DIR to keep deployment state on disk"
        ),
    }
}

/// Template and working directories used by the apply runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub resources_dir: PathBuf,
    pub base: PathBuf,
}

impl Workspace {
    pub fn discover() -> anyhow::Result<Self> {
        Ok(Self {
            resources_dir: saorsa_config::find_resources_dir()?,
            base: saorsa_config::workspace_base()?,
        })
    }

    /// One apply configuration per region, all sharing `variables`
    pub fn configurations(
        &self,
        catalog: &ProviderCatalog,
        regions: &[RegionPair],
        variables: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<ApplyConfiguration>> {
        regions
            .iter()
            .map(|pair| {
                let provider = catalog.get(&pair.provider)?;
                Ok(ApplyConfiguration::for_region(
                    provider,
                    &pair.region,
                    &self.resources_dir,
                    &self.base,
                    variables,
                ))
            })
            .collect()
    }
}
