//! HTTP + WebSocket surface over the connection and messaging core.
//!
//! Provides a REST API for the buddy-request workflow, conversations, and
//! messages, plus a WebSocket change feed, persisting state in SQLite.
//! Authentication is terminated upstream; the verified user id arrives in
//! the `x-user-id` header.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::Arc;

use clap::Parser;

use crate::live::ChangeBus;
use crate::storage::{self, db_path, Storage};

use config::{Cli, Config};
use state::{AppState, SharedState};

/// Entry point: parse CLI, open storage, start the server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::logln!("buddylink starting");
    crate::logln!("  data directory: {}", config.data_dir.display());

    std::fs::create_dir_all(&config.data_dir).expect("failed to create data directory");
    let db_file = db_path(&config.data_dir);
    let store = storage::shared(Storage::open(&db_file).expect("failed to open database"));
    crate::logln!("  database: {}", db_file.display());

    let bus = ChangeBus::new();
    let state: SharedState = Arc::new(AppState::new(store, bus));

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::logln!("buddylink listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
