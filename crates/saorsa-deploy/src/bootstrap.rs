//! The bootstrap VM: a single long-lived host per deployment that runs the
//! genesis node and keeps its data on an attached volume.

use saorsa_cloud::{ComputeProvider, InstanceSpec, Result, VolumeSpec};

pub const BOOTSTRAP_REGION: &str = "lon1";
pub const BOOTSTRAP_SIZE: &str = "s-2vcpu-4gb";
pub const BOOTSTRAP_IMAGE: &str = "ubuntu-24-04-x64";
pub const BOOTSTRAP_VOLUME_SIZE_GB: u32 = 35;

/// Account SSH keys installed on every VM we create
pub const SSH_KEY_IDS: [u64; 9] = [
    36971688, 30643816, 30113222, 42022675, 30878672, 31216015, 34183228, 38596814, 54385801,
];

pub fn bootstrap_instance_name(name: &str) -> String {
    format!("{}-saorsa-bootstrap", name)
}

/// Volume names must be lowercase
pub fn bootstrap_volume_name(name: &str) -> String {
    format!("{}-saorsa-bootstrap-storage", name).to_lowercase()
}

pub fn bootstrap_instance_spec(name: &str) -> InstanceSpec {
    InstanceSpec {
        name: bootstrap_instance_name(name),
        region: BOOTSTRAP_REGION.to_string(),
        size: BOOTSTRAP_SIZE.to_string(),
        image: BOOTSTRAP_IMAGE.to_string(),
        ssh_keys: SSH_KEY_IDS.to_vec(),
    }
}

pub fn bootstrap_volume_spec(name: &str) -> VolumeSpec {
    VolumeSpec {
        name: bootstrap_volume_name(name),
        region: BOOTSTRAP_REGION.to_string(),
        size_gb: BOOTSTRAP_VOLUME_SIZE_GB,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapHost {
    pub instance_name: String,
    pub instance_id: u64,
    pub ip_address: String,
    pub volume_id: String,

    /// Whether the instance or the volume was created by this call
    pub created: bool,
}

/// Make sure the bootstrap VM exists with its volume attached.
///
/// Safe to call repeatedly: existing resources are reused and the attach is
/// only issued when the volume is not already on the instance.
pub async fn ensure_bootstrap(provider: &dyn ComputeProvider, name: &str) -> Result<BootstrapHost> {
    let instance = provider
        .ensure_instance(&bootstrap_instance_spec(name))
        .await?;
    let volume = provider.ensure_volume(&bootstrap_volume_spec(name)).await?;
    provider
        .ensure_attached(&volume.id, instance.id, BOOTSTRAP_REGION)
        .await?;

    Ok(BootstrapHost {
        instance_name: bootstrap_instance_name(name),
        instance_id: instance.id,
        ip_address: instance.ip_address,
        volume_id: volume.id,
        created: instance.created || volume.created,
    })
}

/// What [`destroy_bootstrap`] found and removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapTeardown {
    InstanceAndVolume,
    InstanceOnly,
    VolumeOnly,
    NotFound,
}

impl BootstrapTeardown {
    pub fn found(&self) -> bool {
        !matches!(self, BootstrapTeardown::NotFound)
    }
}

/// Look up the bootstrap VM and volume by name and delete whatever exists
pub async fn destroy_bootstrap(
    provider: &dyn ComputeProvider,
    name: &str,
) -> Result<BootstrapTeardown> {
    let instance = provider
        .find_instance(&bootstrap_instance_name(name))
        .await?;
    let volume = provider
        .find_volume(&bootstrap_volume_name(name), BOOTSTRAP_REGION)
        .await?;

    match (instance, volume) {
        (Some(instance), Some(volume)) => {
            provider
                .destroy_instance_with_volume(instance.id, &volume.id, BOOTSTRAP_REGION)
                .await?;
            Ok(BootstrapTeardown::InstanceAndVolume)
        }
        (Some(instance), None) => {
            provider.destroy_instance(instance.id).await?;
            Ok(BootstrapTeardown::InstanceOnly)
        }
        (None, Some(volume)) => {
            provider.destroy_volume(&volume.id).await?;
            Ok(BootstrapTeardown::VolumeOnly)
        }
        (None, None) => Ok(BootstrapTeardown::NotFound),
    }
}
