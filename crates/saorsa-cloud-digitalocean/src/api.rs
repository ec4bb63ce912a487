//! DigitalOcean REST API client
//!
//! Thin typed wrapper over the droplet and volume endpoints. Every call is a
//! single request: non-2xx responses come back as [`DigitalOceanError::Api`]
//! with the status and body untouched.

use crate::error::{DigitalOceanError, Result};
use saorsa_cloud::PollPolicy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DIGITALOCEAN_API_BASE: &str = "https://api.digitalocean.com/v2";

/// Connection settings for [`DigitalOceanClient`]
#[derive(Debug, Clone)]
pub struct DigitalOceanConfig {
    pub token: String,
    pub base_url: String,

    /// Droplet activation polling
    pub activation: PollPolicy,

    /// Wait between a volume detach and the deletes that follow
    pub detach_settle: Duration,
}

impl DigitalOceanConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: DIGITALOCEAN_API_BASE.to_string(),
            activation: PollPolicy::activation(),
            detach_settle: saorsa_cloud::DEFAULT_DETACH_SETTLE,
        }
    }

    /// Read the API token from `DO_TOKEN`
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("DO_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| DigitalOceanError::MissingEnvVar("DO_TOKEN".to_string()))?;
        Ok(Self::new(token))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_activation_policy(mut self, policy: PollPolicy) -> Self {
        self.activation = policy;
        self
    }

    pub fn with_detach_settle(mut self, settle: Duration) -> Self {
        self.detach_settle = settle;
        self
    }
}

/// Low-level DigitalOcean API client
pub struct DigitalOceanClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl DigitalOceanClient {
    pub fn new(config: &DigitalOceanConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: config.token.clone(),
            base_url: config.base_url.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and fail on any non-2xx status
    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| DigitalOceanError::Http {
                operation: operation.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DigitalOceanError::Api {
                operation: operation.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(|source| DigitalOceanError::Http {
                operation: operation.to_string(),
                source,
            })
    }

    /// List droplets whose name matches exactly
    pub async fn list_droplets_by_name(&self, name: &str) -> Result<Vec<Droplet>> {
        tracing::debug!("GET /droplets?name={}", name);
        let response: DropletsResponse = self
            .send_json(
                "list droplets",
                self.client.get(self.url("/droplets")).query(&[("name", name)]),
            )
            .await?;
        Ok(response
            .droplets
            .into_iter()
            .filter(|d| d.name == name)
            .collect())
    }

    pub async fn get_droplet(&self, id: u64) -> Result<Droplet> {
        tracing::debug!("GET /droplets/{}", id);
        let response: DropletResponse = self
            .send_json(
                "get droplet",
                self.client.get(self.url(&format!("/droplets/{}", id))),
            )
            .await?;
        Ok(response.droplet)
    }

    pub async fn create_droplet(&self, request: &CreateDropletRequest) -> Result<Droplet> {
        tracing::debug!("POST /droplets name={}", request.name);
        let response: DropletResponse = self
            .send_json(
                "create droplet",
                self.client.post(self.url("/droplets")).json(request),
            )
            .await?;
        Ok(response.droplet)
    }

    pub async fn delete_droplet(&self, id: u64) -> Result<()> {
        tracing::debug!("DELETE /droplets/{}", id);
        self.send(
            "delete droplet",
            self.client.delete(self.url(&format!("/droplets/{}", id))),
        )
        .await?;
        Ok(())
    }

    /// List volumes whose name matches exactly within a region
    pub async fn list_volumes_by_name(&self, name: &str, region: &str) -> Result<Vec<ApiVolume>> {
        tracing::debug!("GET /volumes?name={}&region={}", name, region);
        let response: VolumesResponse = self
            .send_json(
                "list volumes",
                self.client
                    .get(self.url("/volumes"))
                    .query(&[("name", name), ("region", region)]),
            )
            .await?;
        Ok(response
            .volumes
            .into_iter()
            .filter(|v| v.name == name)
            .collect())
    }

    pub async fn get_volume(&self, volume_id: &str) -> Result<ApiVolume> {
        tracing::debug!("GET /volumes/{}", volume_id);
        let response: VolumeResponse = self
            .send_json(
                "get volume",
                self.client.get(self.url(&format!("/volumes/{}", volume_id))),
            )
            .await?;
        Ok(response.volume)
    }

    pub async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<ApiVolume> {
        tracing::debug!("POST /volumes name={}", request.name);
        let response: VolumeResponse = self
            .send_json(
                "create volume",
                self.client.post(self.url("/volumes")).json(request),
            )
            .await?;
        Ok(response.volume)
    }

    pub async fn volume_action(&self, volume_id: &str, action: &VolumeActionRequest) -> Result<()> {
        tracing::debug!(
            "POST /volumes/{}/actions type={} droplet={}",
            volume_id,
            action.action_type,
            action.droplet_id
        );
        self.send(
            &format!("{} volume", action.action_type),
            self.client
                .post(self.url(&format!("/volumes/{}/actions", volume_id)))
                .json(action),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        tracing::debug!("DELETE /volumes/{}", volume_id);
        self.send(
            "delete volume",
            self.client.delete(self.url(&format!("/volumes/{}", volume_id))),
        )
        .await?;
        Ok(())
    }
}

// API types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Droplet {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub networks: Networks,
}

impl Droplet {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// The public IPv4 address, falling back to the first v4 network
    pub fn public_ipv4(&self) -> Option<String> {
        self.networks
            .v4
            .iter()
            .find(|n| n.network_type == "public")
            .or_else(|| self.networks.v4.first())
            .map(|n| n.ip_address.clone())
    }

    pub fn region_slug(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.slug.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Networks {
    #[serde(default)]
    pub v4: Vec<NetworkV4>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkV4 {
    pub ip_address: String,
    #[serde(rename = "type")]
    pub network_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRef {
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiVolume {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: Option<RegionRef>,
    #[serde(default)]
    pub droplet_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateDropletRequest {
    pub name: String,
    pub region: String,
    pub size: String,
    pub image: String,
    pub ssh_keys: Vec<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateVolumeRequest {
    pub size_gigabytes: u32,
    pub name: String,
    pub region: String,
    pub filesystem_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeActionRequest {
    #[serde(rename = "type")]
    pub action_type: String,
    pub droplet_id: u64,
    pub region: String,
}

impl VolumeActionRequest {
    pub fn attach(droplet_id: u64, region: impl Into<String>) -> Self {
        Self {
            action_type: "attach".to_string(),
            droplet_id,
            region: region.into(),
        }
    }

    pub fn detach(droplet_id: u64, region: impl Into<String>) -> Self {
        Self {
            action_type: "detach".to_string(),
            droplet_id,
            region: region.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DropletsResponse {
    droplets: Vec<Droplet>,
}

#[derive(Debug, Deserialize)]
struct DropletResponse {
    droplet: Droplet,
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    volumes: Vec<ApiVolume>,
}

#[derive(Debug, Deserialize)]
struct VolumeResponse {
    volume: ApiVolume,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn droplet(networks: serde_json::Value) -> Droplet {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "dev-01-saorsa-bootstrap",
            "status": "active",
            "region": { "slug": "lon1" },
            "networks": { "v4": networks }
        }))
        .unwrap()
    }

    #[test]
    fn test_public_ip_preferred() {
        let d = droplet(serde_json::json!([
            { "ip_address": "10.106.0.2", "type": "private" },
            { "ip_address": "143.198.100.50", "type": "public" }
        ]));
        assert_eq!(d.public_ipv4().as_deref(), Some("143.198.100.50"));
        assert_eq!(d.region_slug(), Some("lon1"));
    }

    #[test]
    fn test_public_ip_falls_back_to_first() {
        let d = droplet(serde_json::json!([
            { "ip_address": "10.106.0.2", "type": "private" }
        ]));
        assert_eq!(d.public_ipv4().as_deref(), Some("10.106.0.2"));

        let d = droplet(serde_json::json!([]));
        assert_eq!(d.public_ipv4(), None);
    }

    #[test]
    fn test_volume_action_body() {
        let body = serde_json::to_value(VolumeActionRequest::attach(42, "lon1")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "type": "attach", "droplet_id": 42, "region": "lon1" })
        );
    }

    #[test]
    #[serial]
    fn test_config_requires_token() {
        // SAFETY: serialized with the other env tests
        unsafe { std::env::remove_var("DO_TOKEN") };
        let err = DigitalOceanConfig::from_env().unwrap_err();
        assert!(matches!(err, DigitalOceanError::MissingEnvVar(ref v) if v == "DO_TOKEN"));

        unsafe { std::env::set_var("DO_TOKEN", "") };
        assert!(DigitalOceanConfig::from_env().is_err());

        unsafe { std::env::set_var("DO_TOKEN", "dop_v1_test") };
        let config = DigitalOceanConfig::from_env().unwrap();
        assert_eq!(config.token, "dop_v1_test");
        assert_eq!(config.base_url, DIGITALOCEAN_API_BASE);
        unsafe { std::env::remove_var("DO_TOKEN") };
    }
}
