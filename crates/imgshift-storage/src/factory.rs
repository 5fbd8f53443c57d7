#[cfg(feature = "storage-local")]
use crate::LocalStorage;
use crate::MemoryStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{Storage, StorageBackend, StorageError, StorageResult};
use imgshift_core::Config;
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_backend() {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket()
                .map(String::from)
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region().map(String::from).ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint().map(String::from);

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config
                .local_storage_path()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
                })?;
            let base_url = config
                .local_storage_base_url()
                .map(String::from)
                .ok_or_else(|| {
                    StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
                })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage backend; objects are lost on restart");
            Ok(Arc::new(MemoryStorage::new(config.bucket_domain())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgshift_core::ImageShiftConfig;

    #[tokio::test]
    async fn test_memory_backend_from_config() {
        let config = Config::new(ImageShiftConfig {
            storage_backend: StorageBackend::Memory,
            bucket_domain: "https://storage.example.com/bucket".to_string(),
            ..Default::default()
        });
        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.backend_type(), StorageBackend::Memory);
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_local_backend_requires_path() {
        let config = Config::new(ImageShiftConfig {
            storage_backend: StorageBackend::Local,
            ..Default::default()
        });
        assert!(matches!(
            create_storage(&config).await,
            Err(StorageError::ConfigError(_))
        ));
    }
}
