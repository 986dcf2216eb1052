//! Conversation handlers.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web_api::state::SharedState;
use crate::web_api::utils::{api_error, core_error, HeaderIdentity};

#[derive(Deserialize)]
pub struct EnsureConversationPayload {
    with: String,
}

/// `POST /api/conversations`: return the conversation between the caller
/// and `with`, creating it on first contact (buddy-gated).
pub async fn ensure_conversation_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<EnsureConversationPayload>,
) -> Response {
    let other = req.with.trim();
    if other.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "with cannot be empty");
    }
    let ident = HeaderIdentity::from_headers(&headers);
    match state.registry.ensure_conversation(&ident, other).await {
        Ok(row) => (StatusCode::OK, axum::Json(serde_json::json!(row))).into_response(),
        Err(e) => core_error(&e),
    }
}

/// `GET /api/conversations`: the caller's conversations, most recent
/// activity first, joined with the other participant's summary.
pub async fn list_conversations_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let mut query = match state.registry.watch_conversations(&ident).await {
        Ok(q) => q,
        Err(e) => return core_error(&e),
    };
    match query.next().await {
        Some(Ok(conversations)) => {
            (StatusCode::OK, axum::Json(serde_json::json!(conversations))).into_response()
        }
        Some(Err(e)) => core_error(&e),
        None => (StatusCode::OK, axum::Json(serde_json::json!([]))).into_response(),
    }
}
