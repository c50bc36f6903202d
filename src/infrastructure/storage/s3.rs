use super::BlobStore;
use crate::config::settings::StorageConfig;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Clone)]
pub struct StorageService {
    pub client: Client,
    pub bucket: String,
}

impl StorageService {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(&config.access_key, &config.secret_key, None, None, "static");

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(s3_config);

        info!(endpoint = %config.endpoint, bucket = %config.bucket, "S3 client configured");

        Self {
            client,
            bucket: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl BlobStore for StorageService {
    async fn get_object_to_file(&self, key: &str, dest: &Path) -> Result<()> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("failed to get object {}: {}", key, DisplayErrorContext(&e)))?;

        let reader = output.body.into_async_read();
        tokio::pin!(reader);

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let bytes = tokio::io::copy(&mut reader, &mut file)
            .await
            .with_context(|| format!("failed to stream object {} to disk", key))?;
        file.flush().await?;

        debug!(key, bytes, dest = %dest.display(), "object downloaded");
        Ok(())
    }

    async fn put_file(&self, key: &str, src: &Path, content_type: &str) -> Result<()> {
        let body = ByteStream::from_path(src)
            .await
            .with_context(|| format!("failed to open {} for upload", src.display()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("failed to upload {}: {}", key, DisplayErrorContext(&e)))?;

        debug!(key, content_type, "object uploaded");
        Ok(())
    }

    async fn remove_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("failed to remove object {}: {}", key, DisplayErrorContext(&e)))?;

        debug!(key, "object removed");
        Ok(())
    }
}
