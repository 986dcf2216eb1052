//! Shared helpers for integration tests: an in-memory core with all four
//! services wired to one store and change bus.

#![allow(dead_code)]

use buddylink::connections::ConnectionManager;
use buddylink::conversations::ConversationRegistry;
use buddylink::identity::StaticIdentity;
use buddylink::live::ChangeBus;
use buddylink::messages::MessageLedger;
use buddylink::profiles::ProfileDirectory;
use buddylink::storage::{self, now_millis, SharedStorage, Storage, UserRow};

pub struct TestCore {
    pub store: SharedStorage,
    pub bus: ChangeBus,
    pub profiles: ProfileDirectory,
    pub connections: ConnectionManager,
    pub registry: ConversationRegistry,
    pub ledger: MessageLedger,
}

pub fn core() -> TestCore {
    let store = storage::shared(Storage::open_in_memory().expect("in-memory db"));
    let bus = ChangeBus::new();
    TestCore {
        profiles: ProfileDirectory::new(store.clone(), bus.clone()),
        connections: ConnectionManager::new(store.clone(), bus.clone()),
        registry: ConversationRegistry::new(store.clone(), bus.clone()),
        ledger: MessageLedger::new(store.clone(), bus.clone()),
        store,
        bus,
    }
}

pub fn ident(id: &str) -> StaticIdentity {
    StaticIdentity::new(id)
}

pub fn user_row(id: &str) -> UserRow {
    UserRow {
        id: id.to_string(),
        first_name: id.to_string(),
        last_name: "Tester".to_string(),
        location: Some("Springfield".to_string()),
        bio: None,
        avatar_url: None,
        favorite_sports: vec!["climbing".to_string()],
        created_at: now_millis(),
    }
}

pub async fn seed_users(core: &TestCore, ids: &[&str]) {
    for id in ids {
        core.profiles
            .register_user(&ident(id), user_row(id))
            .await
            .expect("seed user");
    }
}

/// Full request/accept round trip: `a` asks, `b` accepts.
pub async fn become_buddies(core: &TestCore, a: &str, b: &str) {
    let req = core
        .connections
        .send_request(&ident(a), b)
        .await
        .expect("send request");
    core.connections
        .accept_request(&ident(b), req.id)
        .await
        .expect("accept request");
}
