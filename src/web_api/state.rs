//! Shared application state for the HTTP/WebSocket surface.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::connections::ConnectionManager;
use crate::conversations::ConversationRegistry;
use crate::live::ChangeBus;
use crate::messages::MessageLedger;
use crate::profiles::ProfileDirectory;
use crate::storage::SharedStorage;

pub struct AppState {
    pub store: SharedStorage,
    pub bus: ChangeBus,
    pub profiles: ProfileDirectory,
    pub connections: ConnectionManager,
    pub registry: ConversationRegistry,
    pub ledger: MessageLedger,
    pub ws_connection_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(store: SharedStorage, bus: ChangeBus) -> Self {
        Self {
            profiles: ProfileDirectory::new(store.clone(), bus.clone()),
            connections: ConnectionManager::new(store.clone(), bus.clone()),
            registry: ConversationRegistry::new(store.clone(), bus.clone()),
            ledger: MessageLedger::new(store.clone(), bus.clone()),
            store,
            bus,
            ws_connection_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub type SharedState = Arc<AppState>;
