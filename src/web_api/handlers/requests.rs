//! Buddy request handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::web_api::state::SharedState;
use crate::web_api::utils::{api_error, core_error, HeaderIdentity};

#[derive(Deserialize)]
pub struct SendRequestPayload {
    to: String,
}

/// `POST /api/requests`: send a buddy request from the caller to `to`.
pub async fn send_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<SendRequestPayload>,
) -> Response {
    let to = req.to.trim();
    if to.is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "to cannot be empty");
    }
    let ident = HeaderIdentity::from_headers(&headers);
    match state.connections.send_request(&ident, to).await {
        Ok(row) => (StatusCode::CREATED, axum::Json(serde_json::json!(row))).into_response(),
        Err(e) => core_error(&e),
    }
}

/// `POST /api/requests/:id/accept`
pub async fn accept_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    match state.connections.accept_request(&ident, id).await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "accepted", "id": id})),
        )
            .into_response(),
        Err(e) => core_error(&e),
    }
}

/// `POST /api/requests/:id/reject`
pub async fn reject_request_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    match state.connections.reject_request(&ident, id).await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "rejected", "id": id})),
        )
            .into_response(),
        Err(e) => core_error(&e),
    }
}

/// `GET /api/requests/incoming`: pending requests addressed to the caller,
/// joined with sender summaries.
pub async fn list_incoming_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let mut query = match state.connections.watch_incoming(&ident).await {
        Ok(q) => q,
        Err(e) => return core_error(&e),
    };
    match query.next().await {
        Some(Ok(requests)) => {
            (StatusCode::OK, axum::Json(serde_json::json!(requests))).into_response()
        }
        Some(Err(e)) => core_error(&e),
        None => (StatusCode::OK, axum::Json(serde_json::json!([]))).into_response(),
    }
}

/// `GET /api/requests/outgoing-targets`: user ids the caller has a pending
/// outbound request toward.
pub async fn outgoing_targets_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let mut query = match state.connections.watch_outgoing_pending_targets(&ident).await {
        Ok(q) => q,
        Err(e) => return core_error(&e),
    };
    match query.next().await {
        Some(Ok(targets)) => {
            (StatusCode::OK, axum::Json(serde_json::json!(targets))).into_response()
        }
        Some(Err(e)) => core_error(&e),
        None => (StatusCode::OK, axum::Json(serde_json::json!([]))).into_response(),
    }
}
