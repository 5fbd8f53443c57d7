//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use thiserror::Error;

/// Key probed by [`Storage::probe`]. It is never written.
pub const PROBE_KEY: &str = ".imgshift-probe";

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Transient failures talking to the bucket, as opposed to a definite answer
    /// (missing object, malformed key, bad configuration).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_)
                | StorageError::DownloadFailed(_)
                | StorageError::Unavailable(_)
                | StorageError::IoError(_)
        )
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Reject keys that could escape the bucket root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty() {
        return Err(StorageError::InvalidKey("Storage key is empty".to_string()));
    }
    if storage_key.split('/').any(|segment| segment == "..") || storage_key.starts_with('/') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Storage abstraction trait
///
/// The gateway performs no business logic: it answers existence checks, returns
/// object bytes and writes objects under a caller-chosen key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if an object exists
    async fn exists(&self, storage_key: &str) -> StorageResult<bool>;

    /// Download an object by its storage key
    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>>;

    /// Write data to a specific storage key, overwriting any existing object.
    /// Returns the backend's URL for the written object.
    ///
    /// Only returns `Ok` once the backend has acknowledged the complete write.
    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;

    /// Cheap reachability check used by the readiness probe.
    async fn probe(&self) -> StorageResult<()> {
        self.exists(PROBE_KEY).await.map(|_| ())
    }
}
