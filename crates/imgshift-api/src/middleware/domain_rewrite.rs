//! Domain rewrite response filter
//!
//! Buffers HTML and JSON response bodies, points every URL on a retired image domain
//! at the new one and injects the recovery agent into HTML pages outside the admin
//! area.

use crate::state::RewriteState;
use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use imgshift_core::{inject_agent_script, is_admin_path};
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadKind {
    Html,
    Json,
}

impl PayloadKind {
    fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime == "text/html" || mime == "application/xhtml+xml" {
            Some(PayloadKind::Html)
        } else if mime == "application/json" || mime.ends_with("+json") {
            Some(PayloadKind::Json)
        } else {
            None
        }
    }
}

pub async fn domain_rewrite_middleware(
    State(state): State<Arc<RewriteState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let is_head = request.method() == Method::HEAD;

    let response = next.run(request).await;
    if is_head {
        return response;
    }

    let status = response.status();
    if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
        return response;
    }
    if response.headers().contains_key(header::CONTENT_ENCODING) {
        return response;
    }

    let Some(kind) = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(PayloadKind::from_content_type)
    else {
        return response;
    };

    let declared_len = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .or_else(|| response.body().size_hint().upper());
    match declared_len {
        Some(len) if len <= state.max_body_bytes as u64 => {}
        _ => {
            tracing::debug!(
                path = %path,
                declared_len = ?declared_len,
                "Skipping domain rewrite for large or unsized body"
            );
            return response;
        }
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::error!(path = %path, error = %err, "Failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let start = Instant::now();
    let Some(rewritten) = rewrite_payload(&state, kind, &path, &bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    tracing::debug!(
        path = %path,
        kind = ?kind,
        original_bytes = bytes.len(),
        rewritten_bytes = rewritten.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Response body rewritten"
    );
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(rewritten))
}

/// The rewritten body, or `None` when nothing changed.
fn rewrite_payload(
    state: &RewriteState,
    kind: PayloadKind,
    path: &str,
    body: &[u8],
) -> Option<Vec<u8>> {
    let mut enqueue = |url: &str| {
        if let Some(queue) = &state.queue {
            queue.submit(url);
        }
    };

    match kind {
        PayloadKind::Html => {
            let html = std::str::from_utf8(body).ok()?;
            let rewritten = match &state.rewriter {
                Some(rewriter) => rewriter.rewrite_text_with(html, &mut enqueue),
                None => Cow::Borrowed(html),
            };
            let injected = match &state.agent_script_path {
                Some(script) if !is_admin_path(path, &state.admin_path_prefixes) => {
                    match inject_agent_script(&rewritten, script) {
                        Cow::Owned(with_script) => Some(with_script),
                        Cow::Borrowed(_) => None,
                    }
                }
                _ => None,
            };
            match (injected, rewritten) {
                (Some(out), _) | (None, Cow::Owned(out)) => Some(out.into_bytes()),
                (None, Cow::Borrowed(_)) => None,
            }
        }
        PayloadKind::Json => {
            let rewriter = state.rewriter.as_ref()?;
            let mut value: Value = serde_json::from_slice(body).ok()?;
            let changed = rewriter.rewrite_json(&mut value, &mut enqueue);
            if changed == 0 {
                return None;
            }
            match serde_json::to_vec(&value) {
                Ok(out) => Some(out),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "Failed to re-serialize JSON body");
                    None
                }
            }
        }
    }
}
