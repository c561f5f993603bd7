use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A single object write
#[derive(Debug, Clone, PartialEq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub content_disposition: String,
}

/// Object storage backend operations used by the gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Durably write one object
    async fn put_object(&self, request: PutObjectRequest) -> Result<()>;

    /// Sign a GET request for `bucket/key` valid for `expires_in`
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;

    /// Verify the bucket exists and is reachable with the configured credentials
    async fn check_bucket(&self, bucket: &str) -> Result<()>;
}
