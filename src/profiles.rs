//! User profile store access: provisioning, read-only display summaries,
//! and the live buddy list.
//!
//! The buddy set itself is only ever written by the connection manager's
//! accept flow; this module reads it.

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::live::{Change, ChangeBus, LiveQuery};
use crate::logging;
use crate::storage::{self, SharedStorage, UserRow};

/// The display-facing slice of a profile, joined onto requests and
/// conversations for rendering.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub sports: Vec<String>,
    pub avatar_url: Option<String>,
}

impl From<UserRow> for ProfileSummary {
    fn from(row: UserRow) -> Self {
        Self {
            name: format!("{} {}", row.first_name, row.last_name),
            id: row.id,
            location: row.location,
            sports: row.favorite_sports,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(Clone)]
pub struct ProfileDirectory {
    store: SharedStorage,
    bus: ChangeBus,
}

impl ProfileDirectory {
    pub fn new(store: SharedStorage, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Provision or refresh the caller's own profile record.  This is the
    /// write path the identity collaborator uses at account creation; a
    /// caller can never provision a record for someone else.
    pub async fn register_user(&self, ident: &dyn Identity, row: UserRow) -> Result<(), CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        if caller != row.id {
            return Err(CoreError::NotFound(format!("user {}", row.id)));
        }
        storage::lock(&self.store).upsert_user(&row)?;
        crate::logln!("profile: registered {}", logging::user_id(&row.id));
        self.bus.publish(Change::Profile {
            user_id: row.id.clone(),
        });
        Ok(())
    }

    /// Full profile record.
    pub async fn get_profile(&self, id: &str) -> Result<UserRow, CoreError> {
        storage::lock(&self.store)
            .get_user(id)?
            .ok_or_else(|| CoreError::NotFound(format!("user {id}")))
    }

    /// Display summary for one user.
    pub async fn profile_summary(&self, id: &str) -> Result<ProfileSummary, CoreError> {
        self.get_profile(id).await.map(ProfileSummary::from)
    }

    /// Live view of the caller's buddies, joined with their summaries.
    /// Buddies without a profile record yet are omitted from the snapshot.
    pub async fn watch_buddies(
        &self,
        ident: &dyn Identity,
    ) -> Result<LiveQuery<ProfileSummary>, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let store = self.store.clone();
        let me = caller.clone();
        Ok(LiveQuery::new(
            self.bus.subscribe(),
            Box::new(move |change| match change {
                Change::Buddies { user_id } => *user_id == caller,
                // Any profile edit may change a joined summary.
                Change::Profile { .. } => true,
                _ => false,
            }),
            Box::new(move || {
                let db = storage::lock(&store);
                let mut result = Vec::new();
                for buddy_id in db.list_buddy_ids(&me)? {
                    if let Some(user) = db.get_user(&buddy_id)? {
                        result.push(ProfileSummary::from(user));
                    }
                }
                Ok(result)
            }),
        ))
    }
}
