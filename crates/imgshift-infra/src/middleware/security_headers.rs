use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue};
use axum::{extract::Request, middleware::Next, response::Response};

/// Adds hardening headers to every response.
///
/// No Content-Security-Policy is set: rewritten site pages carry their own inline
/// scripts and third-party assets.
pub async fn security_headers_middleware(
    State(production): State<bool>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    apply_security_headers(response.headers_mut(), production);
    response
}

pub fn apply_security_headers(headers: &mut HeaderMap, production: bool) {
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("X-Frame-Options", HeaderValue::from_static("SAMEORIGIN"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Permissions-Policy",
        HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
    );

    // Only meaningful behind TLS
    if production {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
}
