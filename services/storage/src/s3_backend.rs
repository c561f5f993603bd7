use crate::config::S3Config;
use crate::store::{ObjectStore, PutObjectRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// S3 (or S3-compatible) object store. One client serves every request.
pub struct S3Backend {
    client: S3Client,
}

impl S3Backend {
    /// Create a new S3 backend
    pub async fn new(config: &S3Config) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        // Static keys when configured, otherwise the default provider chain
        if let Some((access_key_id, secret_access_key)) = config.static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "asset-storage-config",
            ));
        }

        let aws_config = loader.load().await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/R2/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = config.endpoint_url.as_deref().unwrap_or("aws"),
            static_credentials = config.static_credentials().is_some(),
            "S3 backend initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self, request), fields(bucket = %request.bucket, key = %request.key))]
    async fn put_object(&self, request: PutObjectRequest) -> Result<()> {
        let size_bytes = request.body.len();

        self.client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(ByteStream::from(request.body))
            .content_type(&request.content_type)
            .content_disposition(&request.content_disposition)
            .send()
            .await
            .context("Failed to upload object to S3")?;

        debug!(size_bytes, "Object written to S3");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String> {
        let presigning_config = PresigningConfig::expires_in(expires_in)
            .context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        Ok(presigned.uri().to_string())
    }

    async fn check_bucket(&self, bucket: &str) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .with_context(|| format!("Bucket {bucket} is not reachable"))?;

        Ok(())
    }
}
