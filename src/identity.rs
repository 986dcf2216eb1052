//! Identity reference seam.
//!
//! Authentication itself lives in an external identity provider; all this
//! crate ever sees is a stable, already-verified user id.  Operations take
//! the caller as `&dyn Identity` and fail `Unauthenticated` when no id is
//! present, before touching the store.

/// A source of the current verified user id.
///
/// The web layer builds one per request from the upstream-verified header;
/// tests and tools use [`StaticIdentity`].
pub trait Identity: Send + Sync {
    /// The verified id of the signed-in user, or `None` when signed out.
    fn current_user_id(&self) -> Option<String>;
}

/// Fixed signed-in user.
pub struct StaticIdentity(pub String);

impl StaticIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl Identity for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// No session at all.
pub struct Anonymous;

impl Identity for Anonymous {
    fn current_user_id(&self) -> Option<String> {
        None
    }
}
