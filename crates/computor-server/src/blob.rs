//! MinIO-compatible object storage for submission artifacts, via
//! `aws-sdk-s3` pointed at a custom endpoint.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use computor_core::{ApiError, ComputorConfig};
use computor_submissions::BlobStore;

pub struct MinioBlobStore {
    client: Client,
}

impl MinioBlobStore {
    pub fn new(config: &ComputorConfig) -> Self {
        let scheme = if config.minio_secure { "https" } else { "http" };
        let endpoint = format!("{scheme}://{}", config.minio_endpoint);

        let credentials = Credentials::new(
            &config.minio_access_key,
            &config.minio_secret_key,
            None,
            None,
            "computor-minio",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();

        Self { client: Client::from_conf(s3_config) }
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), ApiError> {
        if self.client.head_bucket().bucket(bucket).send().await.is_err() {
            self.client
                .create_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|err| ApiError::external(format!("failed to create bucket {bucket}: {err}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MinioBlobStore {
    async fn put(&self, bucket: &str, object_key: &str, bytes: Vec<u8>) -> Result<(), ApiError> {
        self.ensure_bucket(bucket).await?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(object_key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| ApiError::external(format!("failed to store object {object_key}: {err}")))?;
        Ok(())
    }
}
