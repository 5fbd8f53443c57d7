use serde::{Deserialize, Serialize};

/// Body of `POST /ajax/get-fallback-image-url`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRequest {
    /// URL of the image that failed to load. Missing, null and blank are all rejected.
    #[serde(default)]
    pub image_url: Option<String>,
}

impl FallbackRequest {
    pub fn new(image_url: impl Into<String>) -> Self {
        Self {
            image_url: Some(image_url.into()),
        }
    }

    /// The trimmed URL, if one was supplied.
    pub fn image_url(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

/// Envelope returned by the fallback endpoint for every status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResponse {
    pub success: bool,
    pub fallback_image_url: String,
    pub message: String,
}

impl FallbackResponse {
    pub fn ok(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            fallback_image_url: url.into(),
            message: message.into(),
        }
    }

    pub fn failed(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            fallback_image_url: placeholder.into(),
            message: message.into(),
        }
    }
}

/// Body of `GET /ajax/csrf-token`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CsrfTokenResponse {
    pub token: String,
    pub header: String,
}
