//! Terraform runner error types

use saorsa_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare workspace {path}: {source}")]
    Workspace {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TerraformError>;

impl From<TerraformError> for CloudError {
    fn from(err: TerraformError) -> Self {
        CloudError::CommandFailed(err.to_string())
    }
}
