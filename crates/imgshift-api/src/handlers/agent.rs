//! Serves the compiled recovery agent referenced by the injected `<script>` tag.

use crate::constants::{AGENT_GLUE_FILE, AGENT_WASM_FILE};
use crate::state::AppState;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::path::Path;
use std::sync::Arc;

const ASSET_CACHE_CONTROL: &str = "public, max-age=3600";

/// wasm-bindgen output of `imgshift-agent-web`, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AgentAssets {
    pub script_path: String,
    pub wasm_path: String,
    script: Bytes,
    wasm: Bytes,
}

impl AgentAssets {
    /// Read the glue and module from `dir`. The script served at `script_path` is the
    /// glue followed by the call that instantiates the module from `wasm_path`.
    pub async fn load(dir: &Path, script_path: &str) -> anyhow::Result<Self> {
        let glue_file = dir.join(AGENT_GLUE_FILE);
        let wasm_file = dir.join(AGENT_WASM_FILE);
        let glue = tokio::fs::read_to_string(&glue_file)
            .await
            .with_context(|| format!("Failed to read agent glue {}", glue_file.display()))?;
        let wasm = tokio::fs::read(&wasm_file)
            .await
            .with_context(|| format!("Failed to read agent module {}", wasm_file.display()))?;

        let wasm_path = sibling_path(script_path, AGENT_WASM_FILE);
        let script = format!(
            "{}\nwasm_bindgen({{ module_or_path: {} }});\n",
            glue.trim_end(),
            serde_json::to_string(&wasm_path)?
        );

        Ok(Self {
            script_path: script_path.to_string(),
            wasm_path,
            script: Bytes::from(script),
            wasm: Bytes::from(wasm),
        })
    }
}

/// `file` in the same URL directory as `path`.
fn sibling_path(path: &str, file: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, file),
        None => format!("/{}", file),
    }
}

fn asset(state: &AppState, pick: fn(&AgentAssets) -> (&'static str, Bytes)) -> Response {
    match &state.agent {
        Some(assets) => {
            let (content_type, body) = pick(assets);
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, ASSET_CACHE_CONTROL),
                ],
                body,
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn agent_script(State(state): State<Arc<AppState>>) -> Response {
    asset(&state, |assets| {
        ("application/javascript; charset=utf-8", assets.script.clone())
    })
}

pub async fn agent_module(State(state): State<Arc<AppState>>) -> Response {
    asset(&state, |assets| ("application/wasm", assets.wasm.clone()))
}
