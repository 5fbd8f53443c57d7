//! ImageShift Core Library
//!
//! Configuration, wire models, the path codec and the domain rewrite rules shared by
//! every ImageShift crate. Nothing in here performs I/O.

pub mod config;
pub mod constants;
pub mod models;
pub mod paths;
pub mod rewrite;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, ImageShiftConfig, SourceFetchMode};
pub use paths::{
    extract_width, has_webp_suffix, size_marker, ImageReference, ObjectKey, PathCodec,
    RequestedFormat, SizeAllowList, VariantKey,
};
pub use rewrite::{inject_agent_script, is_admin_path, DomainRewriteRule, DomainRewriter};
pub use storage_types::StorageBackend;
