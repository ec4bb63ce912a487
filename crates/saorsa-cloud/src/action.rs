//! Units of declarative-apply work and their outcomes

use crate::catalog::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Direction of a declarative run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyAction {
    /// Create or update the declared resources
    Apply,
    /// Tear the declared resources down
    Destroy,
}

impl ApplyAction {
    /// Verb shown next to a running unit
    pub fn progress_verb(&self) -> &'static str {
        match self {
            ApplyAction::Apply => "applying...",
            ApplyAction::Destroy => "destroying...",
        }
    }
}

impl std::fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplyAction::Apply => write!(f, "apply"),
            ApplyAction::Destroy => write!(f, "destroy"),
        }
    }
}

/// One (provider, region) unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyConfiguration {
    pub provider: String,
    pub region: String,

    /// Directory holding the `*.tf` templates
    pub template_dir: PathBuf,

    /// Isolated working directory for this region
    pub working_dir: PathBuf,

    /// Remote state key, unique per provider and region
    pub state_key: String,

    /// Input variables, kept sorted so invocations are reproducible
    pub variables: BTreeMap<String, String>,
}

impl ApplyConfiguration {
    /// Build the configuration for one region of a provider.
    ///
    /// `region` is always added to the variables.
    pub fn for_region(
        provider: &ProviderConfig,
        region: &str,
        resources_dir: &Path,
        workspace_base: &Path,
        variables: &BTreeMap<String, String>,
    ) -> Self {
        let mut variables = variables.clone();
        variables.insert("region".to_string(), region.to_string());

        Self {
            provider: provider.name.clone(),
            region: region.to_string(),
            template_dir: resources_dir.join(&provider.template_dir),
            working_dir: workspace_base.join(format!("{}-{}", provider.name, region)),
            state_key: provider.state_key(region),
            variables,
        }
    }

    /// `provider/region`
    pub fn key(&self) -> String {
        format!("{}/{}", self.provider, self.region)
    }
}

/// Resource counts reported by one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub added: u32,
    pub changed: u32,
    pub destroyed: u32,
}

impl ResourceCounts {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.changed == 0 && self.destroyed == 0
    }
}

impl std::ops::Add for ResourceCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            added: self.added + rhs.added,
            changed: self.changed + rhs.changed,
            destroyed: self.destroyed + rhs.destroyed,
        }
    }
}

impl std::iter::Sum for ResourceCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, c| acc + c)
    }
}

impl std::fmt::Display for ResourceCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} changed, {} destroyed",
            self.added, self.changed, self.destroyed
        )
    }
}

/// Outcome of running one [`ApplyConfiguration`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub success: bool,
    pub provider: String,
    pub region: String,
    pub stdout: String,
    pub stderr: String,

    /// List-valued outputs (e.g. `droplet_ips`), only populated by apply
    pub outputs: BTreeMap<String, Vec<String>>,

    pub counts: ResourceCounts,
}

impl ApplyResult {
    pub fn failure(
        config: &ApplyConfiguration,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            provider: config.provider.clone(),
            region: config.region.clone(),
            stdout: stdout.into(),
            stderr: stderr.into(),
            outputs: BTreeMap::new(),
            counts: ResourceCounts::default(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.provider, self.region)
    }

    /// IP addresses of the VMs created in this region
    pub fn instance_ips(&self) -> Option<&[String]> {
        self.outputs
            .get(INSTANCE_IPS_OUTPUT)
            .filter(|ips| !ips.is_empty())
            .map(Vec::as_slice)
    }
}

/// Template output carrying the VM addresses
pub const INSTANCE_IPS_OUTPUT: &str = "droplet_ips";
