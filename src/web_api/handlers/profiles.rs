//! Profile provisioning and lookup handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::storage::{now_millis, UserRow};
use crate::web_api::state::SharedState;
use crate::web_api::utils::{api_error, core_error, HeaderIdentity};

#[derive(Deserialize)]
pub struct RegisterUserPayload {
    first_name: String,
    last_name: String,
    location: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    #[serde(default)]
    favorite_sports: Vec<String>,
}

/// `POST /api/users`: provision or refresh the caller's profile record.
/// This is the write path the identity provider drives at account creation.
pub async fn register_user_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(req): axum::Json<RegisterUserPayload>,
) -> Response {
    let ident = HeaderIdentity::from_headers(&headers);
    let Some(caller) = ident.current_user_id() else {
        return core_error(&CoreError::Unauthenticated);
    };
    if req.first_name.trim().is_empty() {
        return api_error(StatusCode::BAD_REQUEST, "first_name cannot be empty");
    }

    let row = UserRow {
        id: caller,
        first_name: req.first_name.trim().to_string(),
        last_name: req.last_name.trim().to_string(),
        location: req.location,
        bio: req.bio,
        avatar_url: req.avatar_url,
        favorite_sports: req.favorite_sports,
        created_at: now_millis(),
    };
    match state.profiles.register_user(&ident, row).await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(serde_json::json!({"status": "registered"})),
        )
            .into_response(),
        Err(e) => core_error(&e),
    }
}

/// `GET /api/users/:id/profile`: display summary for one user.
pub async fn get_profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.profiles.profile_summary(&user_id).await {
        Ok(summary) => (StatusCode::OK, axum::Json(serde_json::json!(summary))).into_response(),
        Err(e) => core_error(&e),
    }
}
