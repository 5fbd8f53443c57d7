use async_trait::async_trait;
use imgshift_core::ObjectKey;

/// Optional last resort consulted when the original asset is not in the bucket.
///
/// Deployments that keep a mapping of legacy asset URLs can plug one in; the
/// returned URL is served as-is.
#[async_trait]
pub trait LegacyDefaultResolver: Send + Sync {
    async fn resolve_default(&self, url: &str, key: &ObjectKey) -> Option<String>;
}

/// Resolver that never knows a replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLegacyResolver;

#[async_trait]
impl LegacyDefaultResolver for NoLegacyResolver {
    async fn resolve_default(&self, _url: &str, _key: &ObjectKey) -> Option<String> {
        None
    }
}
