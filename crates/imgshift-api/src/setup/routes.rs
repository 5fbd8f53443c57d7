//! Route configuration and setup

use crate::constants::{
    CSRF_TOKEN_PATH, FALLBACK_ENDPOINT_PATH, LIVENESS_PATH, MAX_REQUEST_BODY_BYTES, READINESS_PATH,
};
use crate::handlers::{agent, csrf, fallback, health};
use crate::middleware::{
    domain_rewrite_middleware, request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use imgshift_core::Config;
use std::path::Path;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router<()>, anyhow::Error> {
    let mut router = Router::new()
        .route(FALLBACK_ENDPOINT_PATH, post(fallback::get_fallback_image_url))
        .route(CSRF_TOKEN_PATH, get(csrf::get_csrf_token))
        .route(LIVENESS_PATH, get(health::liveness_check))
        .route(READINESS_PATH, get(health::readiness_check));

    if let Some(assets) = &state.agent {
        router = router
            .route(&assets.script_path, get(agent::agent_script))
            .route(&assets.wasm_path, get(agent::agent_module));
    }

    if let Some(site_root) = config.site_root() {
        if !Path::new(site_root).is_dir() {
            return Err(anyhow::anyhow!(
                "SITE_ROOT does not exist or is not a directory: {}",
                site_root
            ));
        }
        tracing::info!(
            site_root = %site_root,
            "Serving static site through the domain rewrite filter"
        );
        router = router.fallback_service(ServeDir::new(site_root));
    }

    // Server-level concurrency limit to protect against resource exhaustion under extreme load
    let http_concurrency_limit = config.http_concurrency_limit().max(1);
    tracing::info!(
        http_concurrency_limit = http_concurrency_limit,
        "HTTP concurrency limit layer enabled"
    );

    let app = router
        .layer(axum::middleware::from_fn_with_state(
            state.rewrite.clone(),
            domain_rewrite_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn_with_state(
            config.is_production(),
            security_headers_middleware,
        ))
        .with_state(state);

    Ok(app)
}
