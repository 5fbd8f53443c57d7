//! Variant resolution
//!
//! Cache-aside over the bucket: the requested variant is looked up by its key and
//! only generated when missing. There is no lock around the exists-then-generate
//! sequence. Two concurrent requests for the same variant may both generate it,
//! which is harmless because the output is deterministic and the write overwrites.
//!
//! [`VariantResolver::resolve`] never fails. Every error is logged and turned into
//! the best URL available, in the worst case the input URL unchanged.

use crate::error::ResolveError;
use crate::legacy::{LegacyDefaultResolver, NoLegacyResolver};
use crate::source::{SourceFetcher, StorageSource};
use bytes::Bytes;
use imgshift_core::constants::SOURCE_TIMEOUT_SECS;
use imgshift_core::{ImageReference, ObjectKey, PathCodec, RequestedFormat, SizeAllowList, VariantKey};
use imgshift_processing::{
    generate_blocking, ImageGenerator, OutputFormat, VariantGenerator, VariantSpec,
};
use imgshift_storage::Storage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a resolution was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing usable was produced: the original is missing or a lookup, fetch or
    /// generation step failed. The input URL is returned.
    Unresolved,
    /// Replacement supplied by the legacy resolver.
    Legacy,
    /// No variant requested; the original on the bucket domain is returned.
    Original,
    /// Every requested object already existed.
    CacheHit,
    /// At least one object was generated and written.
    Generated,
    /// The WebP counterpart could not be produced; the non-WebP variant is returned.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub url: String,
    pub outcome: Outcome,
}

impl Resolution {
    fn new(url: String, outcome: Outcome) -> Self {
        Self { url, outcome }
    }

    fn unresolved(url: &str) -> Self {
        Self::new(url.to_string(), Outcome::Unresolved)
    }
}

/// Resolves incoming image URLs to servable URLs on the bucket domain.
#[derive(Clone)]
pub struct VariantResolver {
    storage: Arc<dyn Storage>,
    source: Arc<dyn SourceFetcher>,
    generator: Arc<dyn VariantGenerator>,
    legacy: Arc<dyn LegacyDefaultResolver>,
    codec: PathCodec,
    sizes: SizeAllowList,
    source_timeout: Duration,
}

impl VariantResolver {
    /// Resolver reading originals through `storage` and generating with the `image` crate.
    pub fn new(storage: Arc<dyn Storage>, codec: PathCodec, sizes: SizeAllowList) -> Self {
        Self {
            source: Arc::new(StorageSource::new(storage.clone())),
            storage,
            generator: Arc::new(ImageGenerator),
            legacy: Arc::new(NoLegacyResolver),
            codec,
            sizes,
            source_timeout: Duration::from_secs(SOURCE_TIMEOUT_SECS),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn SourceFetcher>) -> Self {
        self.source = source;
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn VariantGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_legacy_resolver(mut self, legacy: Arc<dyn LegacyDefaultResolver>) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn codec(&self) -> &PathCodec {
        &self.codec
    }

    pub fn allowed_sizes(&self) -> &SizeAllowList {
        &self.sizes
    }

    /// Resolve `url` to a servable URL. Never fails.
    pub async fn resolve(&self, url: &str) -> String {
        self.resolve_detailed(url).await.url
    }

    /// Like [`resolve`](Self::resolve), also reporting how the URL was obtained.
    pub async fn resolve_detailed(&self, url: &str) -> Resolution {
        let start = Instant::now();
        let original = self.codec.original_key(url);

        if original.as_str().is_empty() {
            tracing::debug!(url = %url, "URL does not address an object; returning it unchanged");
            return Resolution::unresolved(url);
        }

        let resolution = match self.try_resolve(url, &original).await {
            Ok(resolution) => resolution,
            Err(e) => {
                if e.is_storage() {
                    tracing::error!(
                        url = %url,
                        original_key = %original,
                        stage = e.stage(),
                        error = %e,
                        "Resolution failed; returning input URL"
                    );
                } else {
                    tracing::warn!(
                        url = %url,
                        original_key = %original,
                        stage = e.stage(),
                        error = %e,
                        "Resolution failed; returning input URL"
                    );
                }
                Resolution::unresolved(url)
            }
        };

        tracing::debug!(
            url = %url,
            resolved = %resolution.url,
            outcome = ?resolution.outcome,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Resolved image URL"
        );

        resolution
    }

    async fn try_resolve(&self, url: &str, original: &ObjectKey) -> Result<Resolution, ResolveError> {
        if !self.storage.exists(original.as_str()).await? {
            if let Some(replacement) = self.legacy.resolve_default(url, original).await {
                tracing::info!(url = %url, original_key = %original, replacement = %replacement, "Using legacy replacement");
                return Ok(Resolution::new(replacement, Outcome::Legacy));
            }
            tracing::debug!(url = %url, original_key = %original, "Original not in bucket");
            return Ok(Resolution::unresolved(url));
        }

        let reference = ImageReference::new(url);
        let wants_webp = reference.requested_format() == RequestedFormat::Webp;
        let width = reference.requested_width().filter(|&w| {
            let allowed = self.sizes.contains(w);
            if !allowed {
                tracing::debug!(url = %url, width = w, "Width not in allow-list; ignoring resize");
            }
            allowed
        });

        match width {
            None if wants_webp => {
                let webp_key = original.webp();
                let spec = VariantSpec::new(None, OutputFormat::WebP);
                let outcome = self.ensure_variant(&webp_key, original.as_str(), spec).await?;
                Ok(Resolution::new(self.codec.public_url(webp_key.as_str()), outcome))
            }
            None => Ok(Resolution::new(
                self.codec.public_url(original.as_str()),
                Outcome::Original,
            )),
            Some(width) => {
                let variant_key = original.variant(Some(width), RequestedFormat::Original);
                let spec = VariantSpec::new(Some(width), OutputFormat::from_key(original.as_str()));
                let outcome = self.ensure_variant(&variant_key, original.as_str(), spec).await?;

                if !wants_webp {
                    return Ok(Resolution::new(
                        self.codec.public_url(variant_key.as_str()),
                        outcome,
                    ));
                }

                let webp_key = variant_key.with_webp_suffix();
                let spec = VariantSpec::new(None, OutputFormat::WebP);
                match self.ensure_variant(&webp_key, variant_key.as_str(), spec).await {
                    Ok(webp_outcome) => {
                        let outcome = if outcome == Outcome::Generated || webp_outcome == Outcome::Generated {
                            Outcome::Generated
                        } else {
                            Outcome::CacheHit
                        };
                        Ok(Resolution::new(self.codec.public_url(webp_key.as_str()), outcome))
                    }
                    Err(e) => {
                        tracing::warn!(
                            url = %url,
                            variant_key = %webp_key,
                            stage = e.stage(),
                            error = %e,
                            "Failed to create WebP variant; falling back to resized image"
                        );
                        Ok(Resolution::new(
                            self.codec.public_url(variant_key.as_str()),
                            Outcome::Degraded,
                        ))
                    }
                }
            }
        }
    }

    /// Make sure `target` exists, generating it from `source_key` when missing.
    async fn ensure_variant(
        &self,
        target: &VariantKey,
        source_key: &str,
        spec: VariantSpec,
    ) -> Result<Outcome, ResolveError> {
        if self.storage.exists(target.as_str()).await? {
            tracing::debug!(variant_key = %target, "Variant cache hit");
            return Ok(Outcome::CacheHit);
        }

        let start = Instant::now();
        let original = self.fetch_source(source_key).await?;
        let variant = generate_blocking(self.generator.clone(), original, spec).await?;
        let size = variant.data.len();

        self.storage
            .upload_with_key(target.as_str(), variant.data.to_vec(), variant.content_type)
            .await?;

        tracing::info!(
            source_key = %source_key,
            variant_key = %target,
            width = variant.width,
            height = variant.height,
            content_type = variant.content_type,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Generated variant"
        );

        Ok(Outcome::Generated)
    }

    async fn fetch_source(&self, key: &str) -> Result<Bytes, ResolveError> {
        tokio::time::timeout(self.source_timeout, self.source.fetch(key))
            .await
            .map_err(|_| ResolveError::SourceTimeout(self.source_timeout))?
    }
}
