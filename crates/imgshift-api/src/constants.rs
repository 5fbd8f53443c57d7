//! HTTP surface constants.

pub use imgshift_core::constants::{CSRF_TOKEN_PATH, FALLBACK_ENDPOINT_PATH};

/// wasm-bindgen glue emitted for `imgshift-agent-web` (`--target no-modules`).
pub const AGENT_GLUE_FILE: &str = "imgshift_agent_web.js";
/// Compiled agent module, served next to the agent script.
pub const AGENT_WASM_FILE: &str = "imgshift_agent_web_bg.wasm";

pub const LIVENESS_PATH: &str = "/health/live";
pub const READINESS_PATH: &str = "/health/ready";

/// Request bodies are tiny JSON envelopes; anything larger is rejected.
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;
