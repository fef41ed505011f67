use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3::primitives::ByteStream;
use axum::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::storage::{ObjectLocation, ObjectStore};

/// Object storage backed by S3. Credentials and region come from the
/// default provider chain.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub async fn from_env() -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        S3ObjectStore {
            client: aws_sdk_s3::Client::new(&aws_config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[tracing::instrument(level = "info", skip(self, location), fields(%location))]
    async fn download(&self, location: &ObjectLocation, local_path: &Path) -> Result<()> {
        info!("Downloading {} -> {}", location, local_path.display());
        let object = self
            .client
            .get_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {location}"))?;

        let mut file = tokio::fs::File::create(local_path)
            .await
            .with_context(|| format!("Failed to create {}", local_path.display()))?;
        let mut body = object.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .with_context(|| format!("Failed to read body of {location}"))?
        {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(())
    }

    #[tracing::instrument(level = "info", skip(self, location), fields(%location))]
    async fn upload(&self, local_path: &Path, location: &ObjectLocation) -> Result<()> {
        info!("Uploading {} -> {}", local_path.display(), location);
        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;

        self.client
            .put_object()
            .bucket(&location.bucket)
            .key(&location.key)
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to store {location}"))?;

        Ok(())
    }
}
