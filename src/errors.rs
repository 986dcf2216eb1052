//! Public error taxonomy for the connection and messaging core.
//!
//! Every operation returns a typed failure; none are swallowed.  Only
//! [`CoreError::Unavailable`] is worth retrying; everything else reports a
//! condition a retry cannot change, so callers surface it as-is.

use crate::storage::{RequestStatus, StorageError};

#[derive(Debug)]
pub enum CoreError {
    /// Caller has no verified identity.  Checked before anything else; an
    /// operation never acts as a different user than the channel's caller.
    Unauthenticated,
    /// Referenced user/request/conversation does not exist, or the caller
    /// lacks visibility (recipient-only and participant-only checks).
    NotFound(String),
    /// The request already left `pending`; carries the terminal status so
    /// callers can say which one.
    AlreadyResolved(RequestStatus),
    /// A pending request for the same ordered pair already exists.
    DuplicateRequest,
    /// A user tried to send a buddy request to themselves.
    SelfRequest,
    /// Conversation creation attempted without an established buddy relation.
    NotBuddies,
    /// Message text was empty after trimming.
    EmptyMessage,
    /// Message sender is not a participant of the conversation.
    NotParticipant,
    /// The underlying store failed; retryable with backoff by the caller.
    /// The core never retries internally, since a hidden retry could duplicate
    /// writes.
    Unavailable(StorageError),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Unauthenticated => write!(f, "caller is not signed in"),
            CoreError::NotFound(what) => write!(f, "not found: {what}"),
            CoreError::AlreadyResolved(status) => write!(f, "request is already {status}"),
            CoreError::DuplicateRequest => {
                write!(f, "a pending request to this user already exists")
            }
            CoreError::SelfRequest => write!(f, "cannot send a buddy request to yourself"),
            CoreError::NotBuddies => write!(f, "users are not buddies"),
            CoreError::EmptyMessage => write!(f, "message text is empty"),
            CoreError::NotParticipant => {
                write!(f, "sender is not a participant in this conversation")
            }
            CoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Unavailable(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => CoreError::NotFound(what),
            other => CoreError::Unavailable(other),
        }
    }
}

impl CoreError {
    /// Whether the caller may retry with backoff.  Validation and state
    /// failures are terminal: retrying would not change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Unavailable(_))
    }
}
