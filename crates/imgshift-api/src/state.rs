//! Application state.

use crate::handlers::agent::AgentAssets;
use imgshift_core::{Config, DomainRewriter};
use imgshift_infra::CsrfTokens;
use imgshift_services::{ResolutionQueue, Storage, VariantResolver};
use std::sync::Arc;

/// Everything the domain rewrite middleware needs, built once at startup.
#[derive(Clone)]
pub struct RewriteState {
    /// `None` when no old domains or prefix tokens are configured.
    pub rewriter: Option<DomainRewriter>,
    /// Script tag target; `None` when no agent is available to serve.
    pub agent_script_path: Option<String>,
    pub admin_path_prefixes: Vec<String>,
    pub max_body_bytes: usize,
    /// Set when rewritten URLs should also be resolved in the background.
    pub queue: Option<ResolutionQueue>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub resolver: Arc<VariantResolver>,
    pub csrf: CsrfTokens,
    pub rewrite: Arc<RewriteState>,
    pub agent: Option<Arc<AgentAssets>>,
}
