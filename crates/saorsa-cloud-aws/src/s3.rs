//! S3 state backend

use crate::error::AwsError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use saorsa_cloud::StateBackend;

/// Stores state documents as objects in one bucket
pub struct S3StateBackend {
    client: Client,
    bucket: String,
}

impl S3StateBackend {
    /// Create a backend using the default AWS credential chain
    pub async fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.into()))
            .load()
            .await;

        Self::from_client(Client::new(&config), bucket)
    }

    /// Create a backend around a preconfigured client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn s3_error(&self, operation: &'static str, key: &str, message: String) -> AwsError {
        AwsError::S3 {
            operation,
            bucket: self.bucket.clone(),
            key: key.to_string(),
            message,
        }
    }
}

#[async_trait]
impl StateBackend for S3StateBackend {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn get(&self, key: &str) -> saorsa_cloud::Result<Option<Vec<u8>>> {
        tracing::debug!("GetObject s3://{}/{}", self.bucket, key);
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                return match e.into_service_error() {
                    GetObjectError::NoSuchKey(_) => Ok(None),
                    other => Err(self
                        .s3_error("GetObject", key, DisplayErrorContext(&other).to_string())
                        .into()),
                };
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| AwsError::Body(e.to_string()))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn put(&self, key: &str, body: &[u8]) -> saorsa_cloud::Result<()> {
        tracing::debug!("PutObject s3://{}/{}", self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(|e| self.s3_error("PutObject", key, DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> saorsa_cloud::Result<()> {
        tracing::debug!("DeleteObject s3://{}/{}", self.bucket, key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                self.s3_error("DeleteObject", key, DisplayErrorContext(&e).to_string())
            })?;
        Ok(())
    }
}
