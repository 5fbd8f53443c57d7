use crate::state::AppState;
use axum::{extract::State, http::header, response::IntoResponse, Json};
use imgshift_core::constants::CSRF_HEADER;
use imgshift_core::models::CsrfTokenResponse;
use std::sync::Arc;

/// `GET /ajax/csrf-token`: a fresh token for pages that embed it in their `<meta>` tag.
pub async fn get_csrf_token(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CACHE_CONTROL, "no-store")],
        Json(CsrfTokenResponse {
            token: state.csrf.issue(),
            header: CSRF_HEADER.to_string(),
        }),
    )
}
