//! Conversation registry: deterministic 1:1 conversation identity and
//! buddy-gated creation.
//!
//! Both participants derive the same conversation id independently, so
//! "create if absent" makes concurrent first contact collapse to a single
//! record with the loser's write a no-op.  The buddy gate is checked only
//! at creation; an established thread is never retroactively locked.

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::live::{Change, ChangeBus, LiveQuery};
use crate::logging;
use crate::profiles::ProfileSummary;
use crate::storage::{
    self, now_millis, ConversationRow, SharedStorage, CONVERSATION_ID_SEPARATOR,
};

/// Deterministic conversation id for an unordered user pair: sort the two
/// ids lexicographically and join them.  Commutative, and injective as long
/// as user ids never contain the separator (enforced at user provisioning).
pub fn conversation_id_for(user_a: &str, user_b: &str) -> String {
    let (lo, hi) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!("{lo}{CONVERSATION_ID_SEPARATOR}{hi}")
}

/// A conversation joined with the other participant's summary for the
/// conversation list view.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversationView {
    pub id: String,
    pub other: Option<ProfileSummary>,
    pub created_at: u64,
    pub last_message: Option<String>,
    pub last_message_at: Option<u64>,
    pub last_message_by: Option<String>,
}

#[derive(Clone)]
pub struct ConversationRegistry {
    store: SharedStorage,
    bus: ChangeBus,
}

impl ConversationRegistry {
    pub fn new(store: SharedStorage, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Return the conversation between the caller and `other`, creating it
    /// on first contact.  Creation requires an established buddy relation;
    /// an existing record is returned without re-checking the gate.
    ///
    /// Safe to call concurrently from both sides: the deterministic id plus
    /// the create-if-absent write yield exactly one record.
    pub async fn ensure_conversation(
        &self,
        ident: &dyn Identity,
        other: &str,
    ) -> Result<ConversationRow, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let id = conversation_id_for(&caller, other);

        let (row, created) = {
            let db = storage::lock(&self.store);
            if let Some(existing) = db.get_conversation(&id)? {
                (existing, false)
            } else {
                if db.get_user(other)?.is_none() {
                    return Err(CoreError::NotFound(format!("user {other}")));
                }
                if !db.is_buddy(&caller, other)? {
                    return Err(CoreError::NotBuddies);
                }
                let (user_a, user_b) = if caller.as_str() <= other {
                    (caller.clone(), other.to_string())
                } else {
                    (other.to_string(), caller.clone())
                };
                let fresh = ConversationRow {
                    id: id.clone(),
                    user_a,
                    user_b,
                    created_at: now_millis(),
                    last_message: None,
                    last_message_at: None,
                    last_message_by: None,
                };
                let created = db.create_conversation_if_absent(&fresh)?;
                // When the insert lost a concurrent race, read back the row
                // the winner committed.
                let row = if created {
                    fresh
                } else {
                    db.get_conversation(&id)?
                        .ok_or_else(|| CoreError::NotFound(format!("conversation {id}")))?
                };
                (row, created)
            }
        };

        if created {
            crate::logln!(
                "conversation: created {} <-> {}",
                logging::user_id(&caller),
                logging::user_id(other)
            );
            self.bus.publish(Change::Conversations { user_id: caller });
            self.bus.publish(Change::Conversations {
                user_id: other.to_string(),
            });
        }
        Ok(row)
    }

    /// Live view of the caller's conversations ordered by most recent
    /// activity, each joined with the other participant's summary.
    pub async fn watch_conversations(
        &self,
        ident: &dyn Identity,
    ) -> Result<LiveQuery<ConversationView>, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let store = self.store.clone();
        let me = caller.clone();
        Ok(LiveQuery::new(
            self.bus.subscribe(),
            Box::new(move |change| match change {
                Change::Conversations { user_id } => *user_id == caller,
                // The other participant's profile edits change the join.
                Change::Profile { .. } => true,
                _ => false,
            }),
            Box::new(move || {
                let db = storage::lock(&store);
                let mut result = Vec::new();
                for conv in db.list_conversations_for(&me)? {
                    let other_id = conv.other_participant(&me).to_string();
                    let other = db.get_user(&other_id)?.map(ProfileSummary::from);
                    result.push(ConversationView {
                        id: conv.id,
                        other,
                        created_at: conv.created_at,
                        last_message: conv.last_message,
                        last_message_at: conv.last_message_at,
                        last_message_by: conv.last_message_by,
                    });
                }
                Ok(result)
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_commutative() {
        assert_eq!(conversation_id_for("alice", "bob"), conversation_id_for("bob", "alice"));
        assert_eq!(conversation_id_for("alice", "bob"), "alice_bob");
    }

    #[test]
    fn id_distinguishes_pairs() {
        assert_ne!(conversation_id_for("alice", "bob"), conversation_id_for("alice", "carol"));
    }
}
