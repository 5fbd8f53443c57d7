use imgshift_processing::GenerateError;
use imgshift_storage::StorageError;
use std::time::Duration;
use thiserror::Error;

/// Failure of one step of a resolution.
///
/// These never reach the caller of `VariantResolver::resolve`; they are logged and
/// converted into a best-effort URL.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Original object not found: {0}")]
    OriginalNotFound(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Source fetch failed: {0}")]
    SourceFetch(String),

    #[error("Source fetch timed out after {0:?}")]
    SourceTimeout(Duration),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

impl From<StorageError> for ResolveError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ResolveError::OriginalNotFound(key),
            e if e.is_transient() => ResolveError::StorageUnavailable(e),
            e => ResolveError::Storage(e),
        }
    }
}

impl ResolveError {
    /// Short label used in log fields
    pub fn stage(&self) -> &'static str {
        match self {
            ResolveError::OriginalNotFound(_) => "lookup",
            ResolveError::StorageUnavailable(_) | ResolveError::Storage(_) => "storage",
            ResolveError::SourceFetch(_) | ResolveError::SourceTimeout(_) => "fetch",
            ResolveError::Generate(GenerateError::Decode(_)) => "decode",
            ResolveError::Generate(GenerateError::Encode(_)) => "encode",
            ResolveError::Generate(GenerateError::Task(_)) => "generate",
        }
    }

    /// Storage failures are operational problems; bad image data is not.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            ResolveError::StorageUnavailable(_)
                | ResolveError::Storage(_)
                | ResolveError::SourceTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_classification() {
        let not_found: ResolveError = StorageError::NotFound("a.jpg".into()).into();
        assert!(matches!(not_found, ResolveError::OriginalNotFound(_)));

        let unavailable: ResolveError = StorageError::Unavailable("down".into()).into();
        assert!(matches!(unavailable, ResolveError::StorageUnavailable(_)));
        assert!(unavailable.is_storage());
        assert_eq!(unavailable.stage(), "storage");
    }

    #[test]
    fn test_generate_error_stage() {
        let err: ResolveError = GenerateError::Decode("bad".into()).into();
        assert_eq!(err.stage(), "decode");
        assert!(!err.is_storage());
    }
}
