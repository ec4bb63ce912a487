//! DigitalOcean provider error types

use saorsa_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigitalOceanError {
    #[error("{0} environment variable is not set")]
    MissingEnvVar(String),

    #[error("DigitalOcean API error ({status}) during {operation}: {body}")]
    Api {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("HTTP request failed during {operation}: {source}")]
    Http {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response during {operation}: {message}")]
    UnexpectedResponse { operation: String, message: String },

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, DigitalOceanError>;

impl From<DigitalOceanError> for CloudError {
    fn from(err: DigitalOceanError) -> Self {
        match err {
            DigitalOceanError::MissingEnvVar(var) => CloudError::MissingEnvVar(var),
            DigitalOceanError::Api { status, body, .. } => CloudError::Api { status, body },
            DigitalOceanError::Http { operation, source } => CloudError::Http {
                operation,
                message: source.to_string(),
            },
            DigitalOceanError::UnexpectedResponse { operation, message } => CloudError::Http {
                operation,
                message,
            },
            DigitalOceanError::CloudError(e) => e,
        }
    }
}
