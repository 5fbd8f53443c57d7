//! Storage setup and initialization

use anyhow::Result;
use imgshift_core::Config;
use imgshift_services::{create_storage, Storage};
use std::sync::Arc;

/// Build the configured object store gateway. An unreachable bucket is logged, not
/// fatal: resolution degrades to returning input URLs until it comes back.
pub async fn setup_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    tracing::info!("Initializing storage...");
    let storage = create_storage(config).await?;
    let backend = storage.backend_type();

    match storage.probe().await {
        Ok(()) => tracing::info!(backend = %backend, "Storage initialized successfully"),
        Err(e) => tracing::warn!(
            backend = %backend,
            error = %e,
            "Storage initialized but bucket is not reachable yet"
        ),
    }

    Ok(storage)
}
