//! Shared utility functions for the web surface.

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::errors::CoreError;
use crate::identity::Identity;

/// Per-request identity backed by the upstream-verified `x-user-id` header.
/// The external identity provider terminates authentication ahead of this
/// service; a missing or empty header means the caller is signed out.
pub struct HeaderIdentity(Option<String>);

impl HeaderIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let id = headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self(id)
    }
}

impl Identity for HeaderIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, axum::Json(body)).into_response()
}

/// Map a typed core failure onto an HTTP response.  Only `Unavailable`
/// invites a retry, which the 503 communicates.
pub fn core_error(e: &CoreError) -> Response {
    let status = match e {
        CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::AlreadyResolved(_) | CoreError::DuplicateRequest => StatusCode::CONFLICT,
        CoreError::NotBuddies => StatusCode::FORBIDDEN,
        CoreError::SelfRequest | CoreError::EmptyMessage | CoreError::NotParticipant => {
            StatusCode::BAD_REQUEST
        }
        CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    api_error(status, e.to_string())
}
