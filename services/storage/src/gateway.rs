use crate::config::{S3Config, UrlMode};
use crate::object_key::{KeyPrefix, ObjectKey};
use crate::store::{ObjectStore, PutObjectRequest};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

/// Content type used when the caller does not provide one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Errors surfaced by the storage gateway
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// URL a stored object can be read from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccessUrl {
    /// Object key the URL points at
    pub key: String,
    /// Public or presigned URL
    pub url: String,
    /// Expiry of a presigned URL; `None` for public URLs
    pub expires_at: Option<DateTime<Utc>>,
}

/// Uploads objects under generated keys and issues access URLs for them
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    region: String,
    url_mode: UrlMode,
    presign_ttl: Duration,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn ObjectStore>, config: &S3Config) -> Self {
        Self {
            store,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            url_mode: config.url_mode,
            presign_ttl: config.presign_ttl(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Store `body` under a fresh key derived from `filename` and return its access URL.
    ///
    /// A missing filename is rejected before anything reaches the backend. The put
    /// is attempted once; failures are returned to the caller as-is.
    #[instrument(skip(self, body, prefix), fields(size_bytes = body.len(), prefix = %prefix))]
    pub async fn upload(
        &self,
        body: Bytes,
        filename: Option<&str>,
        content_type: Option<&str>,
        prefix: KeyPrefix,
    ) -> Result<AccessUrl, StorageError> {
        let filename = filename
            .filter(|name| !name.is_empty())
            .ok_or_else(|| StorageError::InvalidArgument("filename must be provided".to_string()))?;

        let content_type = content_type
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let key = ObjectKey::new(prefix, filename);
        let size_bytes = body.len();

        debug!(key = %key, content_type, "Uploading object");

        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: key.as_str().to_string(),
            body,
            content_type: content_type.to_string(),
            content_disposition: key.content_disposition(),
        };

        if let Err(e) = self.store.put_object(request).await {
            error!(key = %key, error = %format!("{e:#}"), "Object upload failed");
            metrics::counter!("asset_uploads_total", "prefix" => prefix.as_str(), "outcome" => "failure")
                .increment(1);
            return Err(StorageError::UploadFailed(format!("{e:#}")));
        }

        metrics::counter!("asset_uploads_total", "prefix" => prefix.as_str(), "outcome" => "success")
            .increment(1);
        metrics::histogram!("asset_upload_bytes", "prefix" => prefix.as_str())
            .record(size_bytes as f64);

        info!(key = %key, size_bytes, "Object uploaded");

        self.access_url(key.as_str()).await
    }

    /// Issue an access URL for an existing key in the configured mode
    pub async fn access_url(&self, key: &str) -> Result<AccessUrl, StorageError> {
        match self.url_mode {
            UrlMode::Public => Ok(AccessUrl {
                key: key.to_string(),
                url: self.public_url(key),
                expires_at: None,
            }),
            UrlMode::Presigned => {
                let url = self
                    .store
                    .presign_get(&self.bucket, key, self.presign_ttl)
                    .await
                    .map_err(|e| {
                        error!(key, error = %format!("{e:#}"), "Presigning failed");
                        StorageError::PresignFailed(format!("{e:#}"))
                    })?;

                let expires_at = chrono::Duration::from_std(self.presign_ttl)
                    .ok()
                    .map(|ttl| Utc::now() + ttl);

                Ok(AccessUrl {
                    key: key.to_string(),
                    url,
                    expires_at,
                })
            }
        }
    }

    /// Deterministic virtual-hosted URL; only readable when the bucket allows public read
    pub fn public_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }

    /// Probe the backend bucket
    pub async fn check_bucket(&self) -> Result<(), StorageError> {
        self.store
            .check_bucket(&self.bucket)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockObjectStore;
    use std::sync::Mutex;

    fn s3_config(url_mode: UrlMode) -> S3Config {
        S3Config {
            bucket: "test-bucket".to_string(),
            region: "eu-central-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: None,
            force_path_style: false,
            presign_ttl_secs: 900,
            url_mode,
        }
    }

    fn gateway(store: MockObjectStore, url_mode: UrlMode) -> StorageGateway {
        StorageGateway::new(Arc::new(store), &s3_config(url_mode))
    }

    #[tokio::test]
    async fn test_missing_filename_is_rejected_without_backend_call() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(0);
        store.expect_presign_get().times(0);

        let gateway = gateway(store, UrlMode::Presigned);

        for filename in [None, Some("")] {
            let result = gateway
                .upload(
                    Bytes::from_static(b"data"),
                    filename,
                    Some("image/png"),
                    KeyPrefix::Uploads,
                )
                .await;
            assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
        }
    }

    #[tokio::test]
    async fn test_traversal_filename_and_default_content_type() {
        let captured: Arc<Mutex<Option<PutObjectRequest>>> = Arc::new(Mutex::new(None));
        let sink = captured.clone();

        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(move |request| {
            *sink.lock().unwrap() = Some(request);
            Ok(())
        });

        let gateway = gateway(store, UrlMode::Public);
        let access = gateway
            .upload(
                Bytes::from_static(b"root:x:0:0"),
                Some("../../etc/passwd"),
                None,
                KeyPrefix::Uploads,
            )
            .await
            .unwrap();

        let request = captured.lock().unwrap().take().unwrap();
        assert_eq!(request.bucket, "test-bucket");
        assert_eq!(request.content_type, DEFAULT_CONTENT_TYPE);
        assert_eq!(request.content_disposition, "inline; filename=\"etc_passwd\"");
        assert_eq!(request.body, Bytes::from_static(b"root:x:0:0"));

        let (prefix, rest) = request.key.split_once('/').unwrap();
        assert_eq!(prefix, "uploads");
        // 36-char UUID, a hyphen, then the sanitized name
        assert_eq!(rest.len(), 36 + 1 + "etc_passwd".len());
        assert!(uuid::Uuid::parse_str(&rest[..36]).is_ok());
        assert!(rest.ends_with("-etc_passwd"));

        assert_eq!(access.key, request.key);
    }

    #[tokio::test]
    async fn test_public_url_mode() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(|_| Ok(()));
        store.expect_presign_get().times(0);

        let gateway = gateway(store, UrlMode::Public);
        let access = gateway
            .upload(
                Bytes::from_static(b"png"),
                Some("cat.png"),
                Some("image/png"),
                KeyPrefix::GeneratedImages,
            )
            .await
            .unwrap();

        assert_eq!(
            access.url,
            format!(
                "https://test-bucket.s3.eu-central-1.amazonaws.com/{}",
                access.key
            )
        );
        assert!(access.key.starts_with("generated-images/"));
        assert!(access.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_presigned_mode_passes_ttl_verbatim() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(|_| Ok(()));
        store
            .expect_presign_get()
            .withf(|bucket, key, ttl| {
                bucket == "test-bucket"
                    && key.starts_with("uploads/")
                    && *ttl == Duration::from_secs(900)
            })
            .times(1)
            .returning(|_, key, _| Ok(format!("https://signed.example/{key}?X-Amz-Expires=900")));

        let gateway = gateway(store, UrlMode::Presigned);
        let before = Utc::now();
        let access = gateway
            .upload(
                Bytes::from_static(b"hello"),
                Some("notes.txt"),
                Some("text/plain"),
                KeyPrefix::Uploads,
            )
            .await
            .unwrap();

        assert!(access.url.starts_with("https://signed.example/uploads/"));
        let expires_at = access.expires_at.unwrap();
        assert!(expires_at >= before + chrono::Duration::seconds(900));
        assert!(expires_at <= Utc::now() + chrono::Duration::seconds(900));
    }

    #[tokio::test]
    async fn test_backend_put_failure_is_upload_failed() {
        let mut store = MockObjectStore::new();
        store
            .expect_put_object()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("NoSuchBucket: the bucket does not exist")));
        store.expect_presign_get().times(0);

        let gateway = gateway(store, UrlMode::Presigned);
        let result = gateway
            .upload(
                Bytes::from_static(b"x"),
                Some("x.bin"),
                None,
                KeyPrefix::Uploads,
            )
            .await;

        match result {
            Err(StorageError::UploadFailed(detail)) => assert!(detail.contains("NoSuchBucket")),
            other => panic!("expected UploadFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_presign_failure_is_presign_failed() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(1).returning(|_| Ok(()));
        store
            .expect_presign_get()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("credentials expired")));

        let gateway = gateway(store, UrlMode::Presigned);
        let result = gateway
            .upload(Bytes::from_static(b"x"), Some("x.bin"), None, KeyPrefix::Uploads)
            .await;

        assert!(matches!(result, Err(StorageError::PresignFailed(_))));
    }

    #[tokio::test]
    async fn test_same_filename_yields_distinct_keys() {
        let keys: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = keys.clone();

        let mut store = MockObjectStore::new();
        store.expect_put_object().times(2).returning(move |request| {
            sink.lock().unwrap().push(request.key);
            Ok(())
        });

        let gateway = gateway(store, UrlMode::Public);
        let first = gateway
            .upload(Bytes::from_static(b"a"), Some("same.png"), None, KeyPrefix::Uploads)
            .await
            .unwrap();
        let second = gateway
            .upload(Bytes::from_static(b"b"), Some("same.png"), None, KeyPrefix::Uploads)
            .await
            .unwrap();

        assert_ne!(first.key, second.key);
        assert_ne!(first.url, second.url);
        assert_eq!(keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_access_url_recomputes_without_upload() {
        let mut store = MockObjectStore::new();
        store.expect_put_object().times(0);
        store
            .expect_presign_get()
            .times(2)
            .returning(|_, key, _| Ok(format!("https://signed.example/{key}")));

        let gateway = gateway(store, UrlMode::Presigned);
        let first = gateway.access_url("uploads/abc-file.txt").await.unwrap();
        let second = gateway.access_url("uploads/abc-file.txt").await.unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(first.key, "uploads/abc-file.txt");
    }

    #[tokio::test]
    async fn test_check_bucket_maps_to_unavailable() {
        let mut store = MockObjectStore::new();
        store
            .expect_check_bucket()
            .withf(|bucket| bucket == "test-bucket")
            .returning(|_| Err(anyhow::anyhow!("403 Forbidden")));

        let gateway = gateway(store, UrlMode::Public);
        assert!(matches!(
            gateway.check_bucket().await,
            Err(StorageError::Unavailable(_))
        ));
    }
}
