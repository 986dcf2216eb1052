//! Buddy list handler.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::web_api::state::SharedState;
use crate::web_api::utils::{core_error, HeaderIdentity};

/// `GET /api/buddies`: the caller's buddies with display summaries.
/// One-shot snapshot of the same query the WebSocket feed keeps live.
pub async fn list_buddies_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let mut query = match state.profiles.watch_buddies(&ident).await {
        Ok(q) => q,
        Err(e) => return core_error(&e),
    };
    match query.next().await {
        Some(Ok(buddies)) => {
            (StatusCode::OK, axum::Json(serde_json::json!(buddies))).into_response()
        }
        Some(Err(e)) => core_error(&e),
        None => (StatusCode::OK, axum::Json(serde_json::json!([]))).into_response(),
    }
}
