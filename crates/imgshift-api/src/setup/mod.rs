//! Application setup and initialization

pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use imgshift_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    imgshift_infra::init_telemetry(config.is_production())
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment(),
        backend = %config.storage_backend(),
        bucket_domain = %config.bucket_domain(),
        "Configuration loaded and validated successfully"
    );

    let storage = storage::setup_storage(&config).await?;
    let state = services::initialize_services(&config, storage).await?;
    let router = routes::setup_routes(&config, state.clone())?;

    Ok((state, router))
}
