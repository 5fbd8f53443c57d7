//! Where original bytes come from.
//!
//! Fetchers address the bucket by object key, never by the host of the incoming URL,
//! so an original that was referenced through a retired domain is always read from
//! the canonical bucket.

use crate::error::ResolveError;
use async_trait::async_trait;
use bytes::Bytes;
use imgshift_storage::Storage;
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_USER_AGENT: &str = "Mozilla/5.0 (compatible; ImageProcessor/1.0)";

/// Reads original image bytes by object key.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, key: &str) -> Result<Bytes, ResolveError>;

    fn name(&self) -> &'static str;
}

/// Reads originals through the object store gateway.
#[derive(Clone)]
pub struct StorageSource {
    storage: Arc<dyn Storage>,
}

impl StorageSource {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl SourceFetcher for StorageSource {
    async fn fetch(&self, key: &str) -> Result<Bytes, ResolveError> {
        let data = self.storage.download(key).await?;
        Ok(Bytes::from(data))
    }

    fn name(&self) -> &'static str {
        "storage"
    }
}

/// Downloads originals over HTTP from the public bucket domain.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    bucket_domain: String,
}

impl HttpSource {
    pub fn new(bucket_domain: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(SOURCE_USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ResolveError::SourceFetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            bucket_domain: bucket_domain.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.bucket_domain, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl SourceFetcher for HttpSource {
    async fn fetch(&self, key: &str) -> Result<Bytes, ResolveError> {
        let url = self.url_for(key);
        let start = std::time::Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::SourceFetch(format!("Timed out fetching {}", url))
            } else {
                ResolveError::SourceFetch(format!("Failed to fetch {}: {}", url, e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ResolveError::OriginalNotFound(key.to_string()));
        }
        if !status.is_success() {
            return Err(ResolveError::SourceFetch(format!(
                "Fetching {} returned status {}",
                url, status
            )));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| ResolveError::SourceFetch(format!("Failed to read body of {}: {}", url, e)))?;

        tracing::debug!(
            url = %url,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Fetched original over HTTP"
        );

        Ok(data)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
