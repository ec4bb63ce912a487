//! Cloud provider error types

use thiserror::Error;

/// Errors shared by every provider, runner and state backend.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{0} environment variable is not set")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP request failed during {operation}: {message}")]
    Http { operation: String, message: String },

    #[error("{resource} did not become ready within {seconds}s")]
    ProvisioningTimeout { resource: String, seconds: u64 },

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error(
        "No deployment state found for '{0}'. Was this deployment created with the infra command?"
    )]
    DeploymentNotFound(String),

    #[error("{failed} of {total} region(s) failed to destroy")]
    PartialDestroy { failed: usize, total: usize },

    #[error("State backend error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
