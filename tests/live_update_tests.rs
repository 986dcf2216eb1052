//! Integration tests for the live-update channel contract: snapshot then
//! deltas, relevance filtering, cancellation, and lag degradation.

mod common;

use std::time::Duration;

use buddylink::live::{Change, CHANGE_BUS_CAPACITY};
use tokio::time::timeout;

use common::{core, ident, seed_users};

#[tokio::test]
async fn first_poll_is_the_current_snapshot() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;
    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();

    // Subscribing after the write still starts from the current state.
    let mut incoming = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    let snapshot = incoming.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn snapshots_follow_commit_order_within_a_subscription() {
    let core = core();
    seed_users(&core, &["alice", "bob", "carol", "dave"]).await;

    let mut incoming = core.connections.watch_incoming(&ident("dave")).await.unwrap();
    assert!(incoming.next().await.unwrap().unwrap().is_empty());

    core.connections
        .send_request(&ident("alice"), "dave")
        .await
        .unwrap();
    core.connections
        .send_request(&ident("bob"), "dave")
        .await
        .unwrap();
    core.connections
        .send_request(&ident("carol"), "dave")
        .await
        .unwrap();

    // One snapshot per committed relevant write, never going backwards.
    let first = incoming.next().await.unwrap().unwrap();
    let second = incoming.next().await.unwrap().unwrap();
    let third = incoming.next().await.unwrap().unwrap();
    assert!(first.len() <= second.len());
    assert!(second.len() <= third.len());
    assert_eq!(third.len(), 3);
}

#[tokio::test]
async fn irrelevant_writes_do_not_wake_the_query() {
    let core = core();
    seed_users(&core, &["alice", "bob", "carol"]).await;

    let mut targets = core
        .connections
        .watch_outgoing_pending_targets(&ident("carol"))
        .await
        .unwrap();
    assert!(targets.next().await.unwrap().unwrap().is_empty());

    // Traffic between other users is filtered out without a fetch.
    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    let woke = timeout(Duration::from_millis(50), targets.next()).await;
    assert!(woke.is_err(), "unrelated write must not produce a snapshot");
}

#[tokio::test]
async fn cancel_is_synchronous_and_final() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let mut incoming = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    assert!(incoming.next().await.unwrap().unwrap().is_empty());

    incoming.cancel();
    assert!(incoming.is_cancelled());
    assert!(incoming.next().await.is_none());

    // Writes after cancellation are never delivered.
    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();
    assert!(incoming.next().await.is_none());
}

#[tokio::test]
async fn cancel_before_first_poll_suppresses_the_snapshot() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let mut incoming = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    incoming.cancel();
    assert!(incoming.next().await.is_none());
}

#[tokio::test]
async fn lagged_subscription_degrades_to_a_fresh_snapshot() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;
    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();

    let mut incoming = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    assert_eq!(incoming.next().await.unwrap().unwrap().len(), 1);

    // Overrun the broadcast buffer while the query is not polling.  The
    // missed events collapse into one up-to-date snapshot.
    for _ in 0..(CHANGE_BUS_CAPACITY * 2) {
        core.bus.publish(Change::IncomingRequests {
            user_id: "bob".to_string(),
        });
    }
    let snapshot = incoming.next().await.unwrap().unwrap();
    assert_eq!(snapshot.len(), 1);
}

#[tokio::test]
async fn subscriptions_are_independent() {
    let core = core();
    seed_users(&core, &["alice", "bob"]).await;

    let mut bob_view = core.connections.watch_incoming(&ident("bob")).await.unwrap();
    let mut alice_view = core.connections.watch_incoming(&ident("alice")).await.unwrap();
    assert!(bob_view.next().await.unwrap().unwrap().is_empty());
    assert!(alice_view.next().await.unwrap().unwrap().is_empty());

    core.connections
        .send_request(&ident("alice"), "bob")
        .await
        .unwrap();

    let bob_snapshot = bob_view.next().await.unwrap().unwrap();
    assert_eq!(bob_snapshot.len(), 1);

    // Cancelling one subscription leaves the other alive.
    bob_view.cancel();
    let woke = timeout(Duration::from_millis(50), alice_view.next()).await;
    assert!(woke.is_err(), "alice has no incoming requests to observe");
}
