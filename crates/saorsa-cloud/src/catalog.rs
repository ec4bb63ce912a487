//! Provider catalog and region selection
//!
//! The catalog is plain configuration data built once at startup and passed
//! explicitly to anything that needs to pick regions, so tests can swap in
//! their own provider lists.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const DIGITALOCEAN: &str = "digitalocean";

/// Static description of one cloud provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Provider name (e.g., "digitalocean")
    pub name: String,

    /// Available regions, in selection order
    pub regions: Vec<String>,

    /// Region used for testnet deployments and the bootstrap VM
    pub default_region: String,

    /// Directory under the resources dir holding this provider's templates
    pub template_dir: String,

    /// Prefix of the remote state key, completed with `-<region>.tfstate`
    pub state_key_prefix: String,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        regions: impl IntoIterator<Item = impl Into<String>>,
        default_region: impl Into<String>,
        template_dir: impl Into<String>,
        state_key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            regions: regions.into_iter().map(Into::into).collect(),
            default_region: default_region.into(),
            template_dir: template_dir.into(),
            state_key_prefix: state_key_prefix.into(),
        }
    }

    /// Remote state key for one region of this provider
    pub fn state_key(&self, region: &str) -> String {
        format!("{}-{}.tfstate", self.state_key_prefix, region)
    }
}

/// Immutable set of providers, iterated in name order
#[derive(Debug, Clone)]
pub struct ProviderCatalog {
    providers: BTreeMap<String, ProviderConfig>,
    default_provider: String,
}

impl ProviderCatalog {
    pub fn new(
        providers: impl IntoIterator<Item = ProviderConfig>,
        default_provider: impl Into<String>,
    ) -> Result<Self> {
        let providers: BTreeMap<_, _> = providers
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        let default_provider = default_provider.into();

        if !providers.contains_key(&default_provider) {
            return Err(CloudError::ProviderNotFound(default_provider));
        }

        Ok(Self {
            providers,
            default_provider,
        })
    }

    /// The providers this tool ships with
    pub fn builtin() -> Self {
        let digitalocean = ProviderConfig::new(
            DIGITALOCEAN,
            ["lon1", "nyc1", "ams3", "sfo3", "sgp1", "blr1", "fra1", "tor1"],
            "lon1",
            "digitalocean",
            "saorsa-deploy/do",
        );

        let mut providers = BTreeMap::new();
        providers.insert(digitalocean.name.clone(), digitalocean);
        Self {
            providers,
            default_provider: DIGITALOCEAN.to_string(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers
            .get(name)
            .ok_or_else(|| CloudError::ProviderNotFound(name.to_string()))
    }

    pub fn default_provider(&self) -> &ProviderConfig {
        // The constructor guarantees the default is present.
        &self.providers[&self.default_provider]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.values()
    }

    /// Resolve the provider/region pairs for a deployment.
    ///
    /// In testnet mode only the default provider's default region is used.
    /// Otherwise `region_counts` holds comma-separated counts, one per
    /// provider in name order; a single count is applied to every provider.
    pub fn resolve_regions(&self, region_counts: &str, testnet: bool) -> Result<Vec<RegionPair>> {
        if testnet {
            let default = self.default_provider();
            return Ok(vec![RegionPair::new(
                default.name.clone(),
                default.default_region.clone(),
            )]);
        }

        let mut counts = region_counts
            .split(',')
            .map(|c| {
                let c = c.trim();
                c.parse::<usize>().map_err(|_| {
                    CloudError::InvalidConfig(format!("Invalid region count '{}'", c))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if counts.len() == 1 {
            counts = vec![counts[0]; self.providers.len()];
        } else if counts.len() != self.providers.len() {
            return Err(CloudError::InvalidConfig(format!(
                "Expected {} region counts (one per provider), got {}",
                self.providers.len(),
                counts.len()
            )));
        }

        let mut pairs = Vec::new();
        for (provider, count) in self.providers.values().zip(counts) {
            if count > provider.regions.len() {
                return Err(CloudError::InvalidConfig(format!(
                    "Requested {} regions for {}, but only {} are available",
                    count,
                    provider.name,
                    provider.regions.len()
                )));
            }
            pairs.extend(
                provider.regions[..count]
                    .iter()
                    .map(|region| RegionPair::new(provider.name.clone(), region.clone())),
            );
        }

        Ok(pairs)
    }
}

/// A (provider, region) pair, stored as a two-element JSON array
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct RegionPair {
    pub provider: String,
    pub region: String,
}

impl RegionPair {
    pub fn new(provider: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            region: region.into(),
        }
    }

    /// Key used in status displays and the `vm_ips` map
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RegionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.region)
    }
}

impl From<(String, String)> for RegionPair {
    fn from((provider, region): (String, String)) -> Self {
        Self { provider, region }
    }
}

impl From<RegionPair> for (String, String) {
    fn from(pair: RegionPair) -> Self {
        (pair.provider, pair.region)
    }
}
