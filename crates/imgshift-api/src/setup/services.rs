//! Service initialization and application state setup

use crate::handlers::agent::AgentAssets;
use crate::state::{AppState, RewriteState};
use anyhow::{Context, Result};
use imgshift_core::{Config, SourceFetchMode};
use imgshift_infra::CsrfTokens;
use imgshift_services::{HttpSource, ResolutionQueue, Storage, VariantResolver};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Concurrent resolutions run by the background queue.
const QUEUE_WORKERS: usize = 4;

/// Wire the resolver, rewrite filter state and anti-forgery tokens around `storage`.
pub async fn initialize_services(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let source_timeout = Duration::from_secs(config.source_timeout_secs());

    let mut resolver = VariantResolver::new(
        storage.clone(),
        config.path_codec(),
        config.allowed_sizes().clone(),
    )
    .with_source_timeout(source_timeout);

    if config.source_fetch() == SourceFetchMode::Http {
        let source = HttpSource::new(config.bucket_domain(), source_timeout)
            .context("Failed to build HTTP source fetcher")?;
        resolver = resolver.with_source(Arc::new(source));
    }
    let resolver = Arc::new(resolver);
    tracing::info!(
        source = %config.source_fetch(),
        source_timeout_secs = config.source_timeout_secs(),
        allowed_sizes = config.allowed_sizes().as_slice().len(),
        "Resolution service initialized"
    );

    let rewriter = config
        .domain_rewrite_rule()
        .compile()
        .context("Invalid domain rewrite pattern")?;
    if rewriter.is_none() {
        tracing::info!("Domain rewrite disabled: no old domains or prefix tokens configured");
    }

    let queue = if config.queue_bucket_check() && rewriter.is_some() {
        tracing::info!(
            capacity = config.queue_capacity(),
            workers = QUEUE_WORKERS,
            "Background resolution queue enabled"
        );
        Some(ResolutionQueue::spawn(
            resolver.clone(),
            config.queue_capacity(),
            QUEUE_WORKERS,
        ))
    } else {
        None
    };

    let agent = load_agent(config).await?;
    let agent_script_path = if agent.is_some() || site_serves_agent(config) {
        Some(config.agent_script_path().to_string())
    } else {
        tracing::warn!(
            agent_script = %config.agent_script_path(),
            "No recovery agent to serve (set AGENT_ASSET_DIR); script injection disabled"
        );
        None
    };

    let rewrite = Arc::new(RewriteState {
        rewriter,
        agent_script_path,
        admin_path_prefixes: config.admin_path_prefixes().to_vec(),
        max_body_bytes: config.max_rewrite_body_bytes(),
        queue,
    });

    let csrf = match config.csrf_secret() {
        Some(secret) => CsrfTokens::new(secret),
        None => {
            tracing::warn!(
                "CSRF_SECRET not set, using a per-process secret; tokens will not survive restarts"
            );
            let ephemeral = format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            );
            CsrfTokens::new(ephemeral)
        }
    };

    Ok(Arc::new(AppState {
        config: config.clone(),
        storage,
        resolver,
        csrf,
        rewrite,
        agent,
    }))
}

async fn load_agent(config: &Config) -> Result<Option<Arc<AgentAssets>>> {
    let Some(dir) = config.agent_asset_dir() else {
        return Ok(None);
    };
    let assets = AgentAssets::load(Path::new(dir), config.agent_script_path())
        .await
        .context("AGENT_ASSET_DIR does not hold a built imgshift-agent-web")?;
    tracing::info!(
        script = %assets.script_path,
        module = %assets.wasm_path,
        "Recovery agent assets loaded"
    );
    Ok(Some(Arc::new(assets)))
}

/// The static site ships its own copy of the agent script.
fn site_serves_agent(config: &Config) -> bool {
    config.site_root().is_some_and(|root| {
        Path::new(root)
            .join(config.agent_script_path().trim_start_matches('/'))
            .is_file()
    })
}
