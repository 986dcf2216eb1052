//! Integration tests for the buddy-request workflow: the request state
//! machine, the symmetric relation it establishes, and the live views.

mod common;

use buddylink::errors::CoreError;
use buddylink::identity::Anonymous;
use buddylink::storage::{self, RequestStatus};

use common::{become_buddies, core, ident, seed_users};

#[tokio::test]
async fn send_requires_identity() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let err = core
        .connections
        .send_request(&Anonymous, "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Unauthenticated));
}

#[tokio::test]
async fn send_to_self_is_rejected() {
    let core = core();
    seed_users(&core, &["alice"]).await;

    let err = core
        .connections
        .send_request(&ident("alice"), "alice")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::SelfRequest));
}

#[tokio::test]
async fn send_to_unknown_user_is_not_found() {
    let core = core();
    seed_users(&core, &["alice"]).await;

    let err = core
        .connections
        .send_request(&ident("alice"), "nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_pending_send_is_rejected_and_creates_no_row() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    let err = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateRequest));

    let pending = storage::lock(&core.store).list_incoming_pending("bob").unwrap();
    assert_eq!(pending.len(), 1);
}

#[tokio::test]
async fn opposite_direction_request_is_not_a_duplicate() {
    // The pending-uniqueness invariant is per ordered pair.
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    core.connections
        .send_request(&ident("bob"), "alice")
        .await
        .unwrap();
}

#[tokio::test]
async fn accept_establishes_symmetric_relation() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let req = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    core.connections
        .accept_request(&ident("bob"), req.id)
        .await
        .unwrap();

    let db = storage::lock(&core.store);
    assert!(db.is_buddy("alice", "bob").unwrap());
    assert!(db.is_buddy("bob", "alice").unwrap());
    let row = db.get_buddy_request(req.id).unwrap().unwrap();
    assert_eq!(row.status, RequestStatus::Accepted);
    assert!(row.resolved_at.is_some());
}

#[tokio::test]
async fn accept_is_recipient_only() {
    // The sender cannot accept their own request; to them it reads as
    // missing.
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let req = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    let err = core
        .connections
        .accept_request(&ident("alice"), req.id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));

    let row = storage::lock(&core.store)
        .get_buddy_request(req.id)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RequestStatus::Pending);
}

#[tokio::test]
async fn accept_twice_reports_already_resolved() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let req = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    core.connections
        .accept_request(&ident("bob"), req.id)
        .await
        .unwrap();
    let err = core
        .connections
        .accept_request(&ident("bob"), req.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::AlreadyResolved(RequestStatus::Accepted)
    ));
}

#[tokio::test]
async fn reject_is_terminal_and_touches_no_profiles() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let req = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    core.connections
        .reject_request(&ident("bob"), req.id)
        .await
        .unwrap();

    {
        let db = storage::lock(&core.store);
        let row = db.get_buddy_request(req.id).unwrap().unwrap();
        assert_eq!(row.status, RequestStatus::Rejected);
        assert!(!db.is_buddy("alice", "bob").unwrap());
        assert!(!db.is_buddy("bob", "alice").unwrap());
    }

    let err = core
        .connections
        .accept_request(&ident("bob"), req.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::AlreadyResolved(RequestStatus::Rejected)
    ));
}

#[tokio::test]
async fn resend_is_allowed_once_prior_request_resolved() {
    // Only a *pending* request blocks a duplicate send.
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let req = core
        .connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    core.connections
        .reject_request(&ident("bob"), req.id)
        .await
        .unwrap();
    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
}

#[tokio::test]
async fn resolution_goes_by_id_when_duplicate_pending_rows_exist() {
    // The duplicate-send check races and two pending rows can land for the
    // same pair; accept must resolve exactly the referenced one.
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let (first, second) = {
        let db = storage::lock(&core.store);
        let first = db
            .insert_buddy_request("alice", "bob", storage::now_millis())
            .unwrap();
        let second = db
            .insert_buddy_request("alice", "bob", storage::now_millis())
            .unwrap();
        (first, second)
    };

    core.connections
        .accept_request(&ident("bob"), first.id)
        .await
        .unwrap();

    let db = storage::lock(&core.store);
    assert_eq!(
        db.get_buddy_request(first.id).unwrap().unwrap().status,
        RequestStatus::Accepted
    );
    assert_eq!(
        db.get_buddy_request(second.id).unwrap().unwrap().status,
        RequestStatus::Pending
    );
    assert!(db.is_buddy("alice", "bob").unwrap());
}

#[tokio::test]
async fn watch_incoming_joins_sender_summary() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();

    let mut incoming = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    let snapshot = incoming.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].from, "alice");
    let sender = snapshot[0].sender.as_ref().expect("joined summary");
    assert_eq!(sender.name, "alice Tester");
    assert_eq!(sender.location.as_deref(), Some("Springfield"));
    assert_eq!(sender.sports, vec!["climbing"]);
}

#[tokio::test]
async fn watch_incoming_sees_new_requests_and_resolutions() {
    let core = core();
    seed_users(&core, &["alice", "bob", "carol"]).await;

    let mut incoming = core.connections.watch_incoming(&ident("carol")).await.unwrap();
    assert!(incoming.next().await.unwrap().unwrap().is_empty());

    let req = core
        .connections
        .send_request(&ident("alice"), "carol")
        .await
        .unwrap();
    let snapshot = incoming.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, req.id);

    core.connections
        .accept_request(&ident("carol"), req.id)
        .await
        .unwrap();
    let snapshot = incoming.next().await.unwrap().unwrap();
    assert!(snapshot.is_empty());
}

#[tokio::test]
async fn outgoing_targets_track_pending_sends() {
    let core = core();
    seed_users(&core, &["alice", "bob", "carol"]).await;

    let mut targets = core
        .connections
        .watch_outgoing_pending_targets(&ident("alice"))
        .await
        .unwrap();
    assert!(targets.next().await.unwrap().unwrap().is_empty());

    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    assert_eq!(targets.next().await.unwrap().unwrap(), vec!["bob"]);

    let req = core
        .connections
        .send_request(&ident("alice"), "carol")
        .await
        .unwrap();
    assert_eq!(
        targets.next().await.unwrap().unwrap(),
        vec!["bob", "carol"]
    );

    core.connections
        .reject_request(&ident("carol"), req.id)
        .await
        .unwrap();
    assert_eq!(targets.next().await.unwrap().unwrap(), vec!["bob"]);
}

#[tokio::test]
async fn buddies_view_updates_after_accept() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let mut buddies = core.profiles.watch_buddies(&ident("alice")).await.unwrap();
    assert!(buddies.next().await.unwrap().unwrap().is_empty());

    become_buddies(&core, "alice", "bob").await;

    let snapshot = buddies.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "bob");
}
