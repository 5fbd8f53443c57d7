//! In-memory storage backend
//!
//! Backs the `memory` storage backend and the test suites. Counts every call so
//! callers can assert on cache behaviour (a cache hit performs no `put`).

use crate::traits::{validate_key, Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Default)]
struct Counters {
    exists: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

/// Bucket held in a `HashMap`. Clones share the same objects and counters.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    files: Arc<Mutex<HashMap<String, StoredObject>>>,
    counters: Arc<Counters>,
    unavailable: Arc<AtomicBool>,
    base_url: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://bucket")
    }
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            files: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
            unavailable: Arc::new(AtomicBool::new(false)),
            base_url: base_url.into(),
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable(
                "memory storage marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Seed an object without touching the counters.
    pub fn set_file(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.files().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
    }

    pub fn has_file(&self, key: &str) -> bool {
        self.files().contains_key(key)
    }

    /// Object bytes (for test assertions)
    pub fn get_file(&self, key: &str) -> Option<Vec<u8>> {
        self.files().get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.files().get(key).map(|o| o.content_type.clone())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn put_count(&self) -> usize {
        self.counters.puts.load(Ordering::SeqCst)
    }

    pub fn get_count(&self) -> usize {
        self.counters.gets.load(Ordering::SeqCst)
    }

    pub fn exists_count(&self) -> usize {
        self.counters.exists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        validate_key(storage_key)?;
        self.counters.exists.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.has_file(storage_key))
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        validate_key(storage_key)?;
        self.counters.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.get_file(storage_key)
            .ok_or_else(|| StorageError::NotFound(storage_key.to_string()))
    }

    async fn upload_with_key(
        &self,
        storage_key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        validate_key(storage_key)?;
        self.counters.puts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let size = data.len();
        self.set_file(storage_key, data, content_type);

        tracing::debug!(
            key = %storage_key,
            content_type = %content_type,
            size_bytes = size,
            "Memory storage upload_with_key successful"
        );

        Ok(format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            storage_key
        ))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
