use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Terraform resources directory not found. Checked:\n\
        - SAORSA_RESOURCES_DIR\n\
        - ./resources\n\
        - ./.saorsa/resources\n\
        - ~/.config/saorsa-deploy/resources"
    )]
    ResourcesDirNotFound,

    #[error("SAORSA_RESOURCES_DIR points to {0}, which is not a directory")]
    InvalidResourcesDir(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
