//! ImageShift Services Layer
//!
//! Hosts the resolution service: it orchestrates the path codec, the object store
//! gateway and the variant generator, and re-exports what the API crate needs so
//! that it depends on a single service facade.

pub mod error;
pub mod legacy;
pub mod queue;
pub mod resolver;
pub mod source;

pub use error::ResolveError;
pub use imgshift_processing::{ImageGenerator, OutputFormat, VariantGenerator};
pub use imgshift_storage::{
    create_storage, MemoryStorage, Storage, StorageBackend, StorageError, StorageResult,
};
pub use legacy::{LegacyDefaultResolver, NoLegacyResolver};
pub use queue::ResolutionQueue;
pub use resolver::{Outcome, Resolution, VariantResolver};
pub use source::{HttpSource, SourceFetcher, StorageSource, SOURCE_USER_AGENT};
