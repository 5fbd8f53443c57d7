//! Fallback image resolution endpoint consumed by the client recovery agent.

use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use imgshift_core::constants::CSRF_HEADER;
use imgshift_core::models::{FallbackRequest, FallbackResponse};
use imgshift_services::Outcome;
use std::sync::Arc;
use std::time::Instant;

/// `POST /ajax/get-fallback-image-url`
///
/// Always answers with the `{success, fallbackImageUrl, message}` envelope: 403 for a
/// rejected anti-forgery token, 400 for a missing `imageUrl`, 500 if the resolution
/// task died, 200 otherwise.
pub async fn get_fallback_image_url(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let placeholder = state.config.fallback_image().to_string();

    if !csrf_accepted(&state, &headers) {
        return (
            StatusCode::FORBIDDEN,
            Json(FallbackResponse::failed(
                placeholder,
                "Invalid or missing CSRF token",
            )),
        )
            .into_response();
    }

    // Unparseable bodies are treated like an empty request.
    let request: FallbackRequest = serde_json::from_slice(&body).unwrap_or_default();
    let Some(image_url) = request.image_url().map(str::to_string) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(FallbackResponse::failed(placeholder, "Image URL is required")),
        )
            .into_response();
    };

    let start = Instant::now();
    let resolver = state.resolver.clone();
    let url_for_task = image_url.clone();
    let joined = tokio::spawn(async move { resolver.resolve_detailed(&url_for_task).await }).await;

    match joined {
        Ok(resolution) => {
            tracing::info!(
                image_url = %image_url,
                resolved_url = %resolution.url,
                outcome = ?resolution.outcome,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Fallback image resolved"
            );
            let body = match resolution.outcome {
                Outcome::Unresolved => {
                    FallbackResponse::ok(placeholder, "Using default fallback image")
                }
                _ => FallbackResponse::ok(resolution.url, "Image processed successfully"),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(join_err) => {
            tracing::error!(
                image_url = %image_url,
                error = %join_err,
                "Fallback image resolution task failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(FallbackResponse::failed(
                    placeholder,
                    "Error processing image, using default fallback",
                )),
            )
                .into_response()
        }
    }
}

/// Unverified tokens only reject the request when the token is required.
fn csrf_accepted(state: &AppState, headers: &HeaderMap) -> bool {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty());

    match token {
        Some(token) if state.csrf.verify(token) => true,
        _ if state.config.fallback_require_csrf() => {
            tracing::debug!("Fallback request rejected: missing or invalid CSRF token");
            false
        }
        Some(_) => {
            tracing::warn!("Fallback request with invalid CSRF token, processing anyway");
            true
        }
        None => {
            tracing::warn!("Fallback request without CSRF token, processing anyway");
            true
        }
    }
}
