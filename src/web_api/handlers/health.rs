//! Health check endpoint.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::storage;
use crate::web_api::state::SharedState;

pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let (users, conversations) = {
        let db = storage::lock(&state.store);
        (
            db.count_users().unwrap_or(0),
            db.count_conversations().unwrap_or(0),
        )
    };

    let body = serde_json::json!({
        "status": "ok",
        "users": users,
        "conversations": conversations,
        "ws_connections": state.ws_connection_count.load(Ordering::Relaxed),
    });
    (StatusCode::OK, axum::Json(body))
}
