//! ImageShift API Library
//!
//! The HTTP surface: the fallback resolution endpoint, anti-forgery token issuing,
//! health probes and the domain rewrite response filter.

pub mod constants;
mod handlers;
mod middleware;
pub mod setup;
pub mod state;

pub use handlers::agent::AgentAssets;
pub use setup::initialize_app;
pub use state::{AppState, RewriteState};
