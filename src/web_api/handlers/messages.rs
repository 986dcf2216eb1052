//! Message sending and listing handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web_api::state::SharedState;
use crate::web_api::utils::{core_error, HeaderIdentity};

#[derive(Deserialize)]
pub struct SendMessagePayload {
    text: String,
}

/// `POST /api/conversations/:id/messages`: append a message.  Empty-after-
/// trim text and non-participant senders are rejected before anything is
/// written.
pub async fn send_message_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
    axum::Json(req): axum::Json<SendMessagePayload>,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    match state.ledger.send(&ident, &conversation_id, &req.text).await {
        Ok(row) => (StatusCode::CREATED, axum::Json(serde_json::json!(row))).into_response(),
        Err(e) => core_error(&e),
    }
}

/// `GET /api/conversations/:id/messages`: the full thread, ascending.
pub async fn list_messages_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(conversation_id): Path<String>,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let mut query = match state.ledger.stream(&ident, &conversation_id).await {
        Ok(q) => q,
        Err(e) => return core_error(&e),
    };
    match query.next().await {
        Some(Ok(messages)) => {
            (StatusCode::OK, axum::Json(serde_json::json!(messages))).into_response()
        }
        Some(Err(e)) => core_error(&e),
        None => (StatusCode::OK, axum::Json(serde_json::json!([]))).into_response(),
    }
}
