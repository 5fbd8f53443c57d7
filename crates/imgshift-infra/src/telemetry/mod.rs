//! Tracing initialization
//!
//! `RUST_LOG` overrides the default filter. Production logs are JSON lines, every
//! other environment uses the human-readable formatter.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_DIRECTIVES: &str = "imgshift=debug,tower_http=debug";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_telemetry(production: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_DIRECTIVES.into());

    if production {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;
    }

    tracing::debug!(production, "Telemetry initialized");
    Ok(())
}

pub async fn shutdown_telemetry() {
    tracing::debug!("Telemetry shutdown");
}
