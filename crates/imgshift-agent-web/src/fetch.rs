//! Same-origin calls to the fallback and anti-forgery endpoints.

use imgshift_agent::FallbackReply;
use imgshift_core::constants::{CSRF_HEADER, CSRF_TOKEN_PATH, FALLBACK_ENDPOINT_PATH};
use imgshift_core::models::{CsrfTokenResponse, FallbackRequest, FallbackResponse};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Headers, Request, RequestInit, Response, Window};

fn js_error(message: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&message.to_string())
}

async fn response_text(window: &Window, request: &Request) -> Result<String, JsValue> {
    let response: Response = JsFuture::from(window.fetch_with_request(request))
        .await?
        .dyn_into()?;
    if !response.ok() {
        return Err(js_error(format!(
            "{} returned status {}",
            request.url(),
            response.status()
        )));
    }
    JsFuture::from(response.text()?)
        .await?
        .as_string()
        .ok_or_else(|| js_error("response body is not text"))
}

async fn try_fetch_fallback(
    window: &Window,
    image_url: &str,
    csrf_token: &str,
) -> Result<String, JsValue> {
    let body = serde_json::to_string(&FallbackRequest::new(image_url)).map_err(js_error)?;

    let headers = Headers::new()?;
    headers.set("Content-Type", "application/json")?;
    headers.set("X-Requested-With", "XMLHttpRequest")?;
    headers.set(CSRF_HEADER, csrf_token)?;

    let init = RequestInit::new();
    init.set_method("POST");
    init.set_headers(&headers);
    init.set_body(&JsValue::from_str(&body));
    let request = Request::new_with_str_and_init(FALLBACK_ENDPOINT_PATH, &init)?;

    let text = response_text(window, &request).await?;
    let reply: FallbackResponse = serde_json::from_str(&text).map_err(js_error)?;
    let url = reply.fallback_image_url.trim();
    if url.is_empty() {
        return Err(js_error("fallback response carried no image URL"));
    }
    Ok(url.to_string())
}

/// POST the broken image URL; every failure collapses into [`FallbackReply::Failed`].
pub async fn fetch_fallback(window: &Window, image_url: &str, csrf_token: &str) -> FallbackReply {
    match try_fetch_fallback(window, image_url, csrf_token).await {
        Ok(url) => FallbackReply::Resolved(url),
        Err(err) => {
            web_sys::console::warn_2(&JsValue::from_str("imgshift: fallback request failed"), &err);
            FallbackReply::Failed
        }
    }
}

/// Token from `GET /ajax/csrf-token`, for pages without a `csrf-token` meta tag.
pub async fn fetch_csrf_token(window: &Window) -> Option<String> {
    let request = Request::new_with_str(CSRF_TOKEN_PATH).ok()?;
    let text = response_text(window, &request).await.ok()?;
    let body: CsrfTokenResponse = serde_json::from_str(&text).ok()?;
    Some(body.token).filter(|token| !token.is_empty())
}
