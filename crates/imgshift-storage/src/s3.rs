use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStoreExt, PutOptions, PutPayload,
    Result as ObjectResult,
};

/// S3-compatible storage implementation (AWS, DigitalOcean Spaces, MinIO, ...)
#[derive(Clone)]
pub struct S3Storage {
    store: AmazonS3,
    bucket: String,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - Bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO, "https://sgp1.digitaloceanspaces.com" for Spaces)
    ///
    /// Requests always use path-style addressing (`{endpoint}/{bucket}/{key}`).
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .with_virtual_hosted_style_request(false);

        if let Some(ref endpoint) = endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(S3Storage {
            store,
            bucket,
            region,
            endpoint_url,
        })
    }

    /// Backend URL for an object
    ///
    /// For AWS S3: `https://{bucket}.s3.{region}.amazonaws.com/{key}`.
    /// For S3-compatible providers: `{endpoint}/{bucket}/{key}`.
    fn generate_url(&self, key: &str) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            let base_url = endpoint.trim_end_matches('/');
            format!("{}/{}/{}", base_url, self.bucket, key)
        } else {
            format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            )
        }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        let location = Path::from(storage_key.to_string());
        let start = std::time::Instant::now();

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 head failed"
                );
                Err(StorageError::Unavailable(e.to_string()))
            }
        }
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;
        let start = std::time::Instant::now();
        let location = Path::from(storage_key.to_string());

        let result: ObjectResult<_> = self.store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(storage_key.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %storage_key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;
        let size = bytes.len() as u64;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 download successful"
        );

        Ok(bytes.to_vec())
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_key(storage_key)?;
        let size = data.len() as u64;
        let bytes = Bytes::from(data);
        let location = Path::from(storage_key.to_string());
        let start = std::time::Instant::now();

        let mut attributes = Attributes::new();
        attributes.insert(
            Attribute::ContentType,
            AttributeValue::from(content_type.to_string()),
        );
        let opts = PutOptions::from(attributes);

        let result: ObjectResult<_> = object_store::ObjectStore::put_opts(
            &self.store,
            &location,
            PutPayload::from(bytes),
            opts,
        )
        .await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %self.bucket,
                key = %storage_key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload_with_key failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        let url = self.generate_url(storage_key);

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload_with_key successful"
        );

        Ok(url)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
