//! saorsa-deploy cloud core
//!
//! Provider-neutral building blocks shared by the provider crates, the
//! Terraform runner and the CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  saorsa-deploy                   │
//! │       (infra / provision / destroy / build)      │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼─────────────────▼───────────────────────┐
//! │                  saorsa-cloud                    │
//! │  ┌──────────────┐  ┌───────────────────────┐    │
//! │  │   Catalog    │  │ trait ComputeProvider │    │
//! │  └──────────────┘  └───────────────────────┘    │
//! │  ┌──────────────┐  ┌───────────────────────┐    │
//! │  │  Poll policy │  │ Deployment state store│    │
//! │  └──────────────┘  └───────────────────────┘    │
//! └───────┬─────────────────┬──────────────┬────────┘
//!         │                 │              │
//! ┌───────▼───────┐ ┌───────▼──────┐ ┌─────▼────────┐
//! │ digitalocean  │ │  terraform   │ │  aws (S3)    │
//! └───────────────┘ └──────────────┘ └──────────────┘
//! ```

pub mod action;
pub mod catalog;
pub mod error;
pub mod provider;
pub mod retry;
pub mod state;

// Re-exports
pub use action::{ApplyAction, ApplyConfiguration, ApplyResult, INSTANCE_IPS_OUTPUT, ResourceCounts};
pub use catalog::{ProviderCatalog, ProviderConfig, RegionPair};
pub use error::{CloudError, Result};
pub use provider::{
    ComputeProvider, DEFAULT_DETACH_SETTLE, EnsuredInstance, EnsuredVolume, Instance,
    InstanceSpec, Volume, VolumeSpec,
};
pub use retry::{PollPolicy, best_effort, poll_until};
pub use state::{
    DeploymentRecord, DeploymentStateStore, DeploymentUpdate, FileStateBackend, StateBackend,
};
