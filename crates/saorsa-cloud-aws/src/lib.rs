//! AWS support for saorsa-deploy
//!
//! Provides [`S3StateBackend`], the production storage for deployment
//! records. Credentials come from the standard AWS provider chain.

pub mod error;
pub mod s3;

pub use error::{AwsError, Result};
pub use s3::S3StateBackend;
