//! Browser host for the ImageShift recovery agent.
//!
//! Compiled to WebAssembly and served by `imgshift-api` at the agent script path that
//! the domain rewrite filter injects into HTML pages. On start it reads the
//! anti-forgery token from `<meta name="csrf-token">` (or fetches one from
//! `/ajax/csrf-token`), then drives [`imgshift_agent::RecoveryAgent`] with the page's
//! `<img>` elements, an `IntersectionObserver` for lazy images, a `MutationObserver`
//! for inserted markup and `fetch` for fallback requests.
//!
//! A `<meta name="imgshift-placeholder" content="...">` tag overrides the placeholder.

mod dom;
mod fetch;
mod host;

use host::Host;
use imgshift_agent::AgentConfig;
use imgshift_core::constants::DEFAULT_FALLBACK_IMAGE;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::Document;

const CSRF_META: &str = "csrf-token";
const PLACEHOLDER_META: &str = "imgshift-placeholder";

fn meta_content(document: &Document, name: &str) -> Option<String> {
    document
        .query_selector(&format!("meta[name=\"{}\"]", name))
        .ok()
        .flatten()?
        .get_attribute("content")
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("imgshift: no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("imgshift: no document"))?;

    let meta_token = meta_content(&document, CSRF_META);
    let placeholder = meta_content(&document, PLACEHOLDER_META)
        .unwrap_or_else(|| DEFAULT_FALLBACK_IMAGE.to_string());
    let intersection_supported =
        js_sys::Reflect::has(&window, &JsValue::from_str("IntersectionObserver"))
            .unwrap_or(false);

    spawn_local(async move {
        let csrf_token = match meta_token {
            Some(token) => Some(token),
            None => fetch::fetch_csrf_token(&window).await,
        };
        let config = AgentConfig {
            placeholder,
            csrf_token,
            intersection_supported,
            ..AgentConfig::default()
        };
        if let Err(err) = Host::install(window, document, config) {
            web_sys::console::warn_2(&JsValue::from_str("imgshift: agent not started"), &err);
        }
    });
    Ok(())
}
