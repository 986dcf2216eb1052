//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;

use crate::web_api::handlers;
use crate::web_api::state::SharedState;

/// Build the complete Axum router with all API routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_handler))
        // Users / profiles
        .route("/api/users", post(handlers::profiles::register_user_handler))
        .route(
            "/api/users/:user_id/profile",
            get(handlers::profiles::get_profile_handler),
        )
        // Buddies
        .route("/api/buddies", get(handlers::buddies::list_buddies_handler))
        // Buddy requests
        .route(
            "/api/requests",
            post(handlers::requests::send_request_handler),
        )
        .route(
            "/api/requests/incoming",
            get(handlers::requests::list_incoming_handler),
        )
        .route(
            "/api/requests/outgoing-targets",
            get(handlers::requests::outgoing_targets_handler),
        )
        .route(
            "/api/requests/:id/accept",
            post(handlers::requests::accept_request_handler),
        )
        .route(
            "/api/requests/:id/reject",
            post(handlers::requests::reject_request_handler),
        )
        // Conversations
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations_handler)
                .post(handlers::conversations::ensure_conversation_handler),
        )
        // Messages
        .route(
            "/api/conversations/:conversation_id/messages",
            get(handlers::messages::list_messages_handler)
                .post(handlers::messages::send_message_handler),
        )
        // WebSocket change feed
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .with_state(state)
}
