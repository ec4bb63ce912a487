//! Compute provider trait definition

use crate::error::Result;
use crate::retry::best_effort;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Idempotent lifecycle operations on instances and block-storage volumes.
///
/// Resources are addressed by deterministic names so repeated invocations
/// rediscover what an earlier run created instead of duplicating it.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Returns the provider name (e.g., "digitalocean")
    fn name(&self) -> &str;

    /// Find an instance by exact name
    async fn find_instance(&self, name: &str) -> Result<Option<Instance>>;

    /// Return the named instance, creating it and waiting for it to become
    /// active if it does not exist yet
    async fn ensure_instance(&self, spec: &InstanceSpec) -> Result<EnsuredInstance>;

    /// Find a volume by exact name within a region
    async fn find_volume(&self, name: &str, region: &str) -> Result<Option<Volume>>;

    /// Return the named volume, creating it if it does not exist yet
    async fn ensure_volume(&self, spec: &VolumeSpec) -> Result<EnsuredVolume>;

    /// Attach the volume unless it is already attached to the instance.
    /// Returns `true` when an attach request was issued.
    async fn ensure_attached(&self, volume_id: &str, instance_id: u64, region: &str)
    -> Result<bool>;

    /// Request a detach. Completion is not signalled by the provider.
    async fn detach_volume(&self, volume_id: &str, instance_id: u64, region: &str) -> Result<()>;

    /// Delete an instance. Single attempt, never retried.
    async fn destroy_instance(&self, instance_id: u64) -> Result<()>;

    /// Delete a volume. Single attempt, never retried.
    async fn destroy_volume(&self, volume_id: &str) -> Result<()>;

    /// How long to wait after a detach request before deleting
    fn detach_settle(&self) -> Duration {
        DEFAULT_DETACH_SETTLE
    }

    /// Detach the volume, wait [`Self::detach_settle`], then delete the
    /// instance and the volume.
    ///
    /// The detach is never confirmed: if it has not completed when the
    /// settle delay runs out, the volume delete fails and the error is
    /// returned.
    async fn destroy_instance_with_volume(
        &self,
        instance_id: u64,
        volume_id: &str,
        region: &str,
    ) -> Result<()> {
        best_effort(
            "detach volume",
            self.detach_volume(volume_id, instance_id, region).await,
        );
        tokio::time::sleep(self.detach_settle()).await;

        self.destroy_instance(instance_id).await?;
        self.destroy_volume(volume_id).await
    }
}

/// Settle delay between a detach request and the deletes that follow it
pub const DEFAULT_DETACH_SETTLE: Duration = Duration::from_secs(15);

/// Desired shape of an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_keys: Vec<u64>,
}

/// Desired shape of a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub region: String,
    pub size_gb: u32,
}

/// An instance as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: u64,
    pub name: String,
    pub region: Option<String>,
    pub status: String,
    pub ip_address: Option<String>,
}

/// A volume as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub attached_instance_ids: Vec<u64>,
}

impl Volume {
    pub fn is_attached_to(&self, instance_id: u64) -> bool {
        self.attached_instance_ids.contains(&instance_id)
    }
}

/// Result of [`ComputeProvider::ensure_instance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredInstance {
    pub id: u64,
    pub ip_address: String,
    pub created: bool,
}

/// Result of [`ComputeProvider::ensure_volume`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsuredVolume {
    pub id: String,
    pub created: bool,
}
