//! Health check handlers.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Run an async check with timeout; returns "ready", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => "ready".to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(serde::Serialize)]
struct ReadinessResponse {
    status: &'static str,
    storage: String,
    backend: String,
}

/// Liveness probe - process is running.
pub async fn liveness_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "alive" })),
    )
}

/// Readiness probe - the bucket answers.
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = state.storage.clone();
    let result = run_check(
        CHECK_TIMEOUT,
        async move { storage.probe().await },
        "not_ready",
    )
    .await;

    let ready = result == "ready";
    if !ready {
        tracing::error!(storage = %result, "Storage readiness check failed");
    }

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(ReadinessResponse {
            status: if ready { "ready" } else { "not_ready" },
            storage: result,
            backend: state.storage.backend_type().to_string(),
        }),
    )
}
