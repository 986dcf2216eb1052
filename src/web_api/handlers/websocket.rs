//! WebSocket upgrade and change-feed delivery.
//!
//! Each connection subscribes to the change bus and forwards the events the
//! authenticated caller is allowed to observe.  The subscription dies with
//! the socket: closing the connection is the structured cancellation path,
//! so a torn-down client never keeps paying for delivery.

use std::sync::atomic::Ordering;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::live::Change;
use crate::storage;
use crate::web_api::config::MAX_WS_CONNECTIONS;
use crate::web_api::state::SharedState;
use crate::web_api::utils::{api_error, core_error, HeaderIdentity};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let Some(user_id) = ident.current_user_id() else {
        return core_error(&CoreError::Unauthenticated);
    };

    let current = state.ws_connection_count.load(Ordering::Relaxed);
    if current >= MAX_WS_CONNECTIONS {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("too many WebSocket connections (max {MAX_WS_CONNECTIONS})"),
        );
    }

    ws.on_upgrade(move |socket| ws_connection(socket, state, user_id))
        .into_response()
}

/// Whether the authenticated user may observe this change.
fn visible_to(change: &Change, user_id: &str, state: &SharedState) -> bool {
    match change {
        Change::IncomingRequests { user_id: uid }
        | Change::OutgoingRequests { user_id: uid }
        | Change::Buddies { user_id: uid }
        | Change::Conversations { user_id: uid } => uid == user_id,
        Change::Messages { conversation_id } => storage::lock(&state.store)
            .get_conversation(conversation_id)
            .ok()
            .flatten()
            .map(|conv| conv.is_participant(user_id))
            .unwrap_or(false),
        // Profile summaries are public display data.
        Change::Profile { .. } => true,
    }
}

async fn ws_connection(mut socket: WebSocket, state: SharedState, user_id: String) {
    let mut rx = state.bus.subscribe();
    state.ws_connection_count.fetch_add(1, Ordering::Relaxed);

    loop {
        tokio::select! {
            // Forward visible change events to the WebSocket client
            result = rx.recv() => {
                match result {
                    Ok(change) => {
                        if !visible_to(&change, &user_id, &state) {
                            continue;
                        }
                        if let Ok(json) = serde_json::to_string(&change) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break; // client disconnected
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        crate::logln!("ws client lagged, skipped {n} events");
                        // Notify client so it can refresh its snapshots
                        let lag_msg = serde_json::json!({
                            "type": "events_missed",
                            "count": n,
                        });
                        if let Ok(json) = serde_json::to_string(&lag_msg) {
                            if socket.send(WsMessage::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            // Handle incoming frames from the client
            msg = socket.recv() => {
                match msg {
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = socket.send(WsMessage::Pong(data)).await;
                    }
                    _ => {} // clients have nothing else to say on this channel
                }
            }
        }
    }

    state.ws_connection_count.fetch_sub(1, Ordering::Relaxed);
}
