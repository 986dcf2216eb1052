//! Configuration types and constants for the buddylink server.

use std::path::PathBuf;

use clap::Parser;

/// Maximum concurrent WebSocket connections.
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;

/// Social-connection and messaging server.
///
/// Exposes the buddy-request workflow, gated 1:1 conversations, and ordered
/// message threads over a REST API plus a WebSocket change feed, persisting
/// state in SQLite.  Authentication is terminated upstream; the verified
/// user id arrives in the `x-user-id` header.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "buddylink", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: BUDDYLINK_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: BUDDYLINK_HOME] [default: ~/.buddylink]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("BUDDYLINK_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".buddylink"))
                    .unwrap_or_else(|_| PathBuf::from(".buddylink"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("BUDDYLINK_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        Self {
            bind_addr,
            data_dir,
        }
    }
}
