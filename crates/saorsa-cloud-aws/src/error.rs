//! AWS error types

use saorsa_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("S3 {operation} on s3://{bucket}/{key} failed: {message}")]
    S3 {
        operation: &'static str,
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Failed to read S3 object body: {0}")]
    Body(String),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        CloudError::StateError(err.to_string())
    }
}
