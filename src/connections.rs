//! Connection manager: the buddy-request lifecycle and the symmetric buddy
//! relation it establishes.
//!
//! A request moves `pending -> accepted` or `pending -> rejected`, both
//! terminal, via a conditional store update, so a lost race surfaces as
//! [`CoreError::AlreadyResolved`], never a second transition.  Accepting
//! adds each user to the other's buddy set with two independent
//! add-if-absent writes; if the second write fails the request's terminal
//! status sticks and the call reports the failure rather than pretending
//! the relation is whole.

use crate::errors::CoreError;
use crate::identity::Identity;
use crate::live::{Change, ChangeBus, LiveQuery};
use crate::logging;
use crate::profiles::ProfileSummary;
use crate::storage::{self, now_millis, BuddyRequestRow, RequestStatus, SharedStorage};

/// A pending incoming request joined with the sender's display summary for
/// rendering.  The summary is absent when the sender's profile record has
/// not been provisioned yet.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IncomingRequest {
    pub id: i64,
    pub from: String,
    pub created_at: u64,
    pub sender: Option<ProfileSummary>,
}

#[derive(Clone)]
pub struct ConnectionManager {
    store: SharedStorage,
    bus: ChangeBus,
}

impl ConnectionManager {
    pub fn new(store: SharedStorage, bus: ChangeBus) -> Self {
        Self { store, bus }
    }

    /// Send a buddy request from the caller to `to`.
    ///
    /// The duplicate check is a query immediately before the insert, not a
    /// schema constraint: two near-simultaneous sends can both pass it and
    /// create two pending rows.  Resolution tolerates that (it goes by id),
    /// so the race is accepted rather than hidden.
    pub async fn send_request(
        &self,
        ident: &dyn Identity,
        to: &str,
    ) -> Result<BuddyRequestRow, CoreError> {
        let from = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        if from == to {
            return Err(CoreError::SelfRequest);
        }

        let row = {
            let db = storage::lock(&self.store);
            if db.get_user(to)?.is_none() {
                return Err(CoreError::NotFound(format!("user {to}")));
            }
            if db.find_pending_request(&from, to)?.is_some() {
                return Err(CoreError::DuplicateRequest);
            }
            db.insert_buddy_request(&from, to, now_millis())?
        };

        crate::logln!(
            "request: {} -> {} (id={})",
            logging::user_id(&from),
            logging::user_id(to),
            row.id
        );
        self.bus.publish(Change::IncomingRequests {
            user_id: to.to_string(),
        });
        self.bus.publish(Change::OutgoingRequests { user_id: from });
        Ok(row)
    }

    /// Accept a pending request addressed to the caller, then establish the
    /// buddy relation in both profiles.
    pub async fn accept_request(&self, ident: &dyn Identity, request_id: i64) -> Result<(), CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;

        let from = {
            let db = storage::lock(&self.store);
            let req = self.visible_to_recipient(&db, request_id, &caller)?;
            if req.status.is_terminal() {
                return Err(CoreError::AlreadyResolved(req.status));
            }
            if !db.resolve_buddy_request(request_id, RequestStatus::Accepted, now_millis())? {
                // Lost the resolution race; report the state that won.
                let current = self.visible_to_recipient(&db, request_id, &caller)?;
                return Err(CoreError::AlreadyResolved(current.status));
            }

            // Two independent writes.  A failure between them leaves the
            // relation asymmetric and this call reports it; the terminal
            // request status above is allowed to stick.
            let now = now_millis();
            db.add_buddy(&caller, &req.from_user, now)?;
            db.add_buddy(&req.from_user, &caller, now)?;
            req.from_user
        };

        crate::logln!(
            "request: {} accepted {} (id={})",
            logging::user_id(&caller),
            logging::user_id(&from),
            request_id
        );
        self.bus.publish(Change::IncomingRequests {
            user_id: caller.clone(),
        });
        self.bus.publish(Change::OutgoingRequests {
            user_id: from.clone(),
        });
        self.bus.publish(Change::Buddies {
            user_id: caller.clone(),
        });
        self.bus.publish(Change::Buddies { user_id: from });
        Ok(())
    }

    /// Reject a pending request addressed to the caller.  No profile
    /// mutation takes place.
    pub async fn reject_request(&self, ident: &dyn Identity, request_id: i64) -> Result<(), CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;

        let from = {
            let db = storage::lock(&self.store);
            let req = self.visible_to_recipient(&db, request_id, &caller)?;
            if req.status.is_terminal() {
                return Err(CoreError::AlreadyResolved(req.status));
            }
            if !db.resolve_buddy_request(request_id, RequestStatus::Rejected, now_millis())? {
                let current = self.visible_to_recipient(&db, request_id, &caller)?;
                return Err(CoreError::AlreadyResolved(current.status));
            }
            req.from_user
        };

        crate::logln!(
            "request: {} rejected (id={})",
            logging::user_id(&caller),
            request_id
        );
        self.bus.publish(Change::IncomingRequests { user_id: caller });
        self.bus.publish(Change::OutgoingRequests { user_id: from });
        Ok(())
    }

    /// Live view of pending requests addressed to the caller, newest first,
    /// each joined with the sender's summary.
    pub async fn watch_incoming(
        &self,
        ident: &dyn Identity,
    ) -> Result<LiveQuery<IncomingRequest>, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let store = self.store.clone();
        let me = caller.clone();
        Ok(LiveQuery::new(
            self.bus.subscribe(),
            Box::new(move |change| match change {
                Change::IncomingRequests { user_id } => *user_id == caller,
                // Sender profile edits change the joined summaries.
                Change::Profile { .. } => true,
                _ => false,
            }),
            Box::new(move || {
                let db = storage::lock(&store);
                let mut result = Vec::new();
                for req in db.list_incoming_pending(&me)? {
                    let sender = db.get_user(&req.from_user)?.map(ProfileSummary::from);
                    result.push(IncomingRequest {
                        id: req.id,
                        from: req.from_user,
                        created_at: req.created_at,
                        sender,
                    });
                }
                Ok(result)
            }),
        ))
    }

    /// Live view of the user ids the caller has a pending outbound request
    /// toward.  The UI renders these as "request sent"; the authoritative
    /// duplicate gate stays in [`ConnectionManager::send_request`].
    pub async fn watch_outgoing_pending_targets(
        &self,
        ident: &dyn Identity,
    ) -> Result<LiveQuery<String>, CoreError> {
        let caller = ident.current_user_id().ok_or(CoreError::Unauthenticated)?;
        let store = self.store.clone();
        let me = caller.clone();
        Ok(LiveQuery::new(
            self.bus.subscribe(),
            Box::new(move |change| {
                matches!(change, Change::OutgoingRequests { user_id } if *user_id == caller)
            }),
            Box::new(move || Ok(storage::lock(&store).list_outgoing_pending_targets(&me)?)),
        ))
    }

    /// Fetch a request enforcing recipient-only visibility: a request that
    /// exists but is not addressed to `caller` reads as not found.
    fn visible_to_recipient(
        &self,
        db: &storage::Storage,
        request_id: i64,
        caller: &str,
    ) -> Result<BuddyRequestRow, CoreError> {
        match db.get_buddy_request(request_id)? {
            Some(req) if req.to_user == caller => Ok(req),
            _ => Err(CoreError::NotFound(format!("request {request_id}"))),
        }
    }
}
