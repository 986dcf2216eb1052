//! Message ledger: append-only ordered messages per conversation.
//!
//! Appends carry a server-assigned timestamp that never runs backwards
//! within a conversation, with a per-conversation arrival counter breaking
//! ties; client clocks are never consulted for ordering.  After a
//! successful append the parent conversation's last-message summary is
//! updated in a second write; the two are intentionally not atomic (the
//! store contract offers no cross-record transaction to lean on).

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::live::{Change, ChangeBus, LiveQuery};
use crate::logging;
use crate::storage::{self, MessageRow, SharedStorage};

#[derive(Clone)]
pub struct MessageLedger {
    store: SharedStorage,
    bus: ChangeBus,
}

impl MessageLedger {
    pub fn new(store: SharedStorage, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Append a message from the caller to the conversation, then mirror it
    /// into the conversation's summary fields.
    pub async fn send(
        &self,
        ident: &dyn Identity,
        conversation_id: &str,
        text: &str,
    ) -> Result<MessageRow, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let body = text.trim();
        if body.is_empty() {
            return Err(CoreError::EmptyMessage);
        }

        let (row, conv) = {
            let db = storage::lock(&self.store);
            let conv = db
                .get_conversation(conversation_id)?
                .ok_or_else(|| CoreError::NotFound(format!("conversation {conversation_id}")))?;
            if !conv.is_participant(&caller) {
                return Err(CoreError::NotParticipant);
            }
            let row = db.append_message(conversation_id, &caller, body)?;
            db.update_conversation_summary(conversation_id, &row.body, &row.sender_id, row.created_at)?;
            (row, conv)
        };

        crate::logln!(
            "message: {} appended {} to {}",
            logging::user_id(&caller),
            logging::msg_id(&row.id),
            conversation_id
        );
        self.bus.publish(Change::Messages {
            conversation_id: conversation_id.to_string(),
        });
        self.bus.publish(Change::Conversations {
            user_id: conv.user_a.clone(),
        });
        self.bus.publish(Change::Conversations {
            user_id: conv.user_b.clone(),
        });
        Ok(row)
    }

    /// Live, ascending stream of a conversation's messages.  Only
    /// participants may observe a thread; to anyone else it reads as not
    /// found.
    pub async fn stream(
        &self,
        ident: &dyn Identity,
        conversation_id: &str,
    ) -> Result<LiveQuery<MessageRow>, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        {
            // Non-participants must not learn whether the thread exists.
            let db = storage::lock(&self.store);
            match db.get_conversation(conversation_id)? {
                Some(conv) if conv.is_participant(&caller) => {}
                _ => {
                    return Err(CoreError::NotFound(format!(
                        "conversation {conversation_id}"
                    )))
                }
            }
        }

        let store = self.store.clone();
        let id = conversation_id.to_string();
        let fetch_id = id.clone();
        Ok(LiveQuery::new(
            self.bus.subscribe(),
            Box::new(move |change| {
                matches!(change, Change::Messages { conversation_id } if *conversation_id == id)
            }),
            Box::new(move || Ok(storage::lock(&store).list_messages(&fetch_id)?)),
        ))
    }
}
