//! ImageShift Storage Library
//!
//! The object store gateway: a narrow `exists` / `download` / `upload_with_key`
//! capability over a bucket, with S3-compatible, local filesystem and in-memory
//! backends.
//!
//! # Storage key format
//!
//! Keys are bucket-relative paths such as `2025/09/w300/photo.jpg`. They must not
//! contain `..` or a leading `/`.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use imgshift_core::StorageBackend;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{validate_key, Storage, StorageError, StorageResult};
