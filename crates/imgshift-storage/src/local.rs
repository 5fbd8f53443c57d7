use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory mirroring the bucket (e.g., "/var/lib/imgshift/bucket")
    /// * `base_url` - Base URL the directory is served under (e.g., "http://localhost:3000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path with security validation
    ///
    /// Rejects keys with traversal sequences, and keys that resolve (through
    /// symlinks) outside the base directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        validate_key(storage_key)?;

        let path = self.base_path.join(storage_key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    fn generate_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Sibling path the object is written to before being renamed into place.
    fn partial_path(path: &Path) -> PathBuf {
        let n = PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.{}.partial", name, std::process::id(), n))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Unavailable(format!(
                "Failed to stat {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(storage_key.to_string()))
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read file {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(data)
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let partial = Self::partial_path(&path);

        let write = async {
            let mut file = fs::File::create(&partial).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    partial.display(),
                    e
                ))
            })?;
            file.write_all(&data).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write file {}: {}",
                    partial.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to sync file {}: {}",
                    partial.display(),
                    e
                ))
            })?;
            fs::rename(&partial, &path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move {} into place: {}",
                    path.display(),
                    e
                ))
            })
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&partial).await;
            tracing::error!(
                error = %e,
                key = %storage_key,
                size_bytes = size,
                "Local storage upload_with_key failed"
            );
            return Err(e);
        }

        let url = self.generate_url(storage_key);

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            content_type = %content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload_with_key successful"
        );

        Ok(url)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn probe(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.base_path).await.map_err(|e| {
            StorageError::Unavailable(format!(
                "Storage directory {} unavailable: {}",
                self.base_path.display(),
                e
            ))
        })?;
        if meta.is_dir() {
            Ok(())
        } else {
            Err(StorageError::Unavailable(format!(
                "{} is not a directory",
                self.base_path.display()
            )))
        }
    }
}
