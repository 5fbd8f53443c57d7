//! HTTP client for the fallback resolution endpoint.

use crate::agent::FallbackReply;
use imgshift_core::constants::{CSRF_HEADER, FALLBACK_ENDPOINT_PATH};
use imgshift_core::models::{FallbackRequest, FallbackResponse};
use reqwest::Client;
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum AgentClientError {
    #[error("Failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Fallback request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Fallback endpoint returned status {0}")]
    Status(u16),

    #[error("Fallback response carried no image URL")]
    EmptyUrl,
}

/// Posts `{"imageUrl": ...}` to `/ajax/get-fallback-image-url` on one site.
#[derive(Clone, Debug)]
pub struct FallbackClient {
    client: Client,
    endpoint: String,
}

impl FallbackClient {
    pub fn new(base_url: &str) -> Result<Self, AgentClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(AgentClientError::Build)?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), FALLBACK_ENDPOINT_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Replacement URL for `image_url`.
    pub async fn try_fetch(
        &self,
        image_url: &str,
        csrf_token: &str,
    ) -> Result<String, AgentClientError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CSRF_HEADER, csrf_token)
            .json(&FallbackRequest::new(image_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgentClientError::Status(status.as_u16()));
        }

        let body: FallbackResponse = response.json().await?;
        let url = body.fallback_image_url.trim();
        if url.is_empty() {
            return Err(AgentClientError::EmptyUrl);
        }
        Ok(url.to_string())
    }

    /// Every failure mode collapses into [`FallbackReply::Failed`].
    pub async fn fetch(&self, image_url: &str, csrf_token: &str) -> FallbackReply {
        match self.try_fetch(image_url, csrf_token).await {
            Ok(url) => FallbackReply::Resolved(url),
            Err(e) => {
                tracing::debug!(image_url = %image_url, error = %e, "Fallback request failed");
                FallbackReply::Failed
            }
        }
    }
}
