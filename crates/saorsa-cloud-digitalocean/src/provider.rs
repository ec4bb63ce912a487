//! DigitalOcean provider implementation

use crate::api::{
    ApiVolume, CreateDropletRequest, CreateVolumeRequest, DigitalOceanClient, DigitalOceanConfig,
    Droplet, VolumeActionRequest,
};
use crate::error::{DigitalOceanError, Result};
use async_trait::async_trait;
use saorsa_cloud::{
    CloudError, ComputeProvider, EnsuredInstance, EnsuredVolume, Instance, InstanceSpec,
    PollPolicy, Volume, VolumeSpec, poll_until,
};
use std::time::Duration;

/// DigitalOcean droplet and volume lifecycle
pub struct DigitalOceanProvider {
    client: DigitalOceanClient,
    activation: PollPolicy,
    detach_settle: Duration,
}

impl DigitalOceanProvider {
    pub fn new(config: DigitalOceanConfig) -> Self {
        Self {
            client: DigitalOceanClient::new(&config),
            activation: config.activation,
            detach_settle: config.detach_settle,
        }
    }

    /// Build a provider from `DO_TOKEN`, failing before any network I/O
    /// when it is unset
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(DigitalOceanConfig::from_env()?))
    }

    async fn wait_for_active(&self, id: u64) -> saorsa_cloud::Result<Droplet> {
        let resource = format!("Droplet {}", id);
        poll_until(self.activation, &resource, move || async move {
            let droplet = self.client.get_droplet(id).await.map_err(CloudError::from)?;
            Ok::<_, CloudError>(droplet.is_active().then_some(droplet))
        })
        .await
    }

    fn ip_of(droplet: &Droplet) -> Result<String> {
        droplet
            .public_ipv4()
            .ok_or_else(|| DigitalOceanError::UnexpectedResponse {
                operation: "read droplet networks".to_string(),
                message: format!("droplet {} has no IPv4 address", droplet.id),
            })
    }
}

impl From<Droplet> for Instance {
    fn from(droplet: Droplet) -> Self {
        Self {
            ip_address: droplet.public_ipv4(),
            region: droplet.region_slug().map(str::to_string),
            id: droplet.id,
            name: droplet.name,
            status: droplet.status,
        }
    }
}

impl From<ApiVolume> for Volume {
    fn from(volume: ApiVolume) -> Self {
        Self {
            id: volume.id,
            name: volume.name,
            region: volume.region.map(|r| r.slug),
            attached_instance_ids: volume.droplet_ids,
        }
    }
}

#[async_trait]
impl ComputeProvider for DigitalOceanProvider {
    fn name(&self) -> &str {
        saorsa_cloud::catalog::DIGITALOCEAN
    }

    async fn find_instance(&self, name: &str) -> saorsa_cloud::Result<Option<Instance>> {
        let droplets = self.client.list_droplets_by_name(name).await?;
        Ok(droplets.into_iter().next().map(Instance::from))
    }

    async fn ensure_instance(&self, spec: &InstanceSpec) -> saorsa_cloud::Result<EnsuredInstance> {
        let existing = self
            .client
            .list_droplets_by_name(&spec.name)
            .await?
            .into_iter()
            .find(|d| d.region_slug().is_none_or(|slug| slug == spec.region));

        if let Some(droplet) = existing {
            tracing::info!("Droplet {} already exists (id {})", spec.name, droplet.id);
            return Ok(EnsuredInstance {
                id: droplet.id,
                ip_address: Self::ip_of(&droplet)?,
                created: false,
            });
        }

        let request = CreateDropletRequest {
            name: spec.name.clone(),
            region: spec.region.clone(),
            size: spec.size.clone(),
            image: spec.image.clone(),
            ssh_keys: spec.ssh_keys.clone(),
        };
        let created = self.client.create_droplet(&request).await?;
        tracing::info!("Created droplet {} (id {})", spec.name, created.id);

        let droplet = self.wait_for_active(created.id).await?;
        Ok(EnsuredInstance {
            id: droplet.id,
            ip_address: Self::ip_of(&droplet)?,
            created: true,
        })
    }

    async fn find_volume(&self, name: &str, region: &str) -> saorsa_cloud::Result<Option<Volume>> {
        let volumes = self.client.list_volumes_by_name(name, region).await?;
        Ok(volumes.into_iter().next().map(Volume::from))
    }

    async fn ensure_volume(&self, spec: &VolumeSpec) -> saorsa_cloud::Result<EnsuredVolume> {
        if let Some(volume) = self.find_volume(&spec.name, &spec.region).await? {
            tracing::info!("Volume {} already exists (id {})", spec.name, volume.id);
            return Ok(EnsuredVolume {
                id: volume.id,
                created: false,
            });
        }

        let request = CreateVolumeRequest {
            size_gigabytes: spec.size_gb,
            name: spec.name.clone(),
            region: spec.region.clone(),
            filesystem_type: "ext4".to_string(),
        };
        let volume = self.client.create_volume(&request).await?;
        tracing::info!("Created volume {} (id {})", spec.name, volume.id);

        Ok(EnsuredVolume {
            id: volume.id,
            created: true,
        })
    }

    async fn ensure_attached(
        &self,
        volume_id: &str,
        instance_id: u64,
        region: &str,
    ) -> saorsa_cloud::Result<bool> {
        let attached = self
            .client
            .get_volume(volume_id)
            .await?
            .droplet_ids
            .contains(&instance_id);

        if attached {
            tracing::debug!("Volume {} already attached to {}", volume_id, instance_id);
            return Ok(false);
        }

        self.client
            .volume_action(volume_id, &VolumeActionRequest::attach(instance_id, region))
            .await?;
        tracing::info!("Attached volume {} to droplet {}", volume_id, instance_id);
        Ok(true)
    }

    async fn detach_volume(
        &self,
        volume_id: &str,
        instance_id: u64,
        region: &str,
    ) -> saorsa_cloud::Result<()> {
        self.client
            .volume_action(volume_id, &VolumeActionRequest::detach(instance_id, region))
            .await?;
        Ok(())
    }

    async fn destroy_instance(&self, instance_id: u64) -> saorsa_cloud::Result<()> {
        self.client.delete_droplet(instance_id).await?;
        tracing::info!("Deleted droplet {}", instance_id);
        Ok(())
    }

    async fn destroy_volume(&self, volume_id: &str) -> saorsa_cloud::Result<()> {
        self.client.delete_volume(volume_id).await?;
        tracing::info!("Deleted volume {}", volume_id);
        Ok(())
    }

    fn detach_settle(&self) -> Duration {
        self.detach_settle
    }
}
