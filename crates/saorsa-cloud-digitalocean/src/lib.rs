//! DigitalOcean provider for saorsa-deploy
//!
//! Implements [`saorsa_cloud::ComputeProvider`] on top of the DigitalOcean
//! REST API so the CLI can manage the bootstrap droplet, its storage volume
//! and ephemeral build droplets.
//!
//! # Requirements
//!
//! - `DO_TOKEN` must hold a DigitalOcean API token
//!
//! # Example
//!
//! ```ignore
//! use saorsa_cloud::{ComputeProvider, InstanceSpec};
//! use saorsa_cloud_digitalocean::DigitalOceanProvider;
//!
//! let provider = DigitalOceanProvider::from_env()?;
//! let droplet = provider
//!     .ensure_instance(&InstanceSpec {
//!         name: "DEV-01-saorsa-bootstrap".into(),
//!         region: "lon1".into(),
//!         size: "s-2vcpu-4gb".into(),
//!         image: "ubuntu-24-04-x64".into(),
//!         ssh_keys: vec![],
//!     })
//!     .await?;
//! println!("{} (created: {})", droplet.ip_address, droplet.created);
//! ```

pub mod api;
pub mod error;
pub mod provider;

pub use api::{DIGITALOCEAN_API_BASE, DigitalOceanClient, DigitalOceanConfig, Droplet};
pub use error::{DigitalOceanError, Result};
pub use provider::DigitalOceanProvider;
