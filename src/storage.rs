//! SQLite storage layer for the social-connection core.
//!
//! Owns schema creation and CRUD for all record types (users, buddy edges,
//! buddy requests, conversations, messages).  Every piece of shared mutable
//! state is written through one of the connection's atomic primitives:
//! buddy edges and conversations with `INSERT OR IGNORE` (idempotent
//! add-if-absent), request resolution with a conditional `UPDATE` that only
//! matches the `pending` state, and message appends inside a transaction
//! that assigns a per-conversation arrival counter.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Separator used when deriving a conversation id from a user pair.
/// User ids must never contain it; [`Storage::upsert_user`] enforces this.
pub const CONVERSATION_ID_SEPARATOR: char = '_';

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    NotFound(String),
    InvalidId(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::NotFound(msg) => write!(f, "not found: {msg}"),
            StorageError::InvalidId(msg) => write!(f, "invalid id: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User profile row.  The buddy set lives in its own table (see
/// [`Storage::add_buddy`]); everything else here is display payload the
/// connection workflow only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub location: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub favorite_sports: Vec<String>,
    pub created_at: u64,
}

/// Lifecycle state of a buddy request.  `Accepted` and `Rejected` are
/// terminal; a request transitions out of `Pending` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buddy request row.  `resolved_at` is set exactly once, when the status
/// leaves `pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuddyRequestRow {
    pub id: i64,
    pub from_user: String,
    pub to_user: String,
    pub status: RequestStatus,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
}

/// Conversation row.  `user_a < user_b` always holds (the pair is sorted
/// before the row is created), and `id` is the deterministic join of the
/// two.  Summary fields are null until the first message lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: u64,
    pub last_message: Option<String>,
    pub last_message_at: Option<u64>,
    pub last_message_by: Option<String>,
}

impl ConversationRow {
    pub fn is_participant(&self, user: &str) -> bool {
        self.user_a == user || self.user_b == user
    }

    /// The participant that is not `user`.  Callers check membership first.
    pub fn other_participant(&self, user: &str) -> &str {
        if self.user_a == user {
            &self.user_b
        } else {
            &self.user_a
        }
    }
}

/// Message row.  `seq` is the per-conversation arrival counter; together
/// with `created_at` it gives the total order the ledger promises.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub seq: i64,
    pub sender_id: String,
    pub body: String,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current time as milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Generate a fresh random message id (32 hex chars).
pub fn new_message_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Database file path inside a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("buddylink.db")
}

/// Storage handle shared between the services and their live queries.
/// Locks are held only for the duration of a single store call, never
/// across an await point.
pub type SharedStorage = Arc<Mutex<Storage>>;

pub fn shared(storage: Storage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Lock the shared storage, recovering the guard if a previous holder
/// panicked mid-write.
pub fn lock(store: &SharedStorage) -> MutexGuard<'_, Storage> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn conversion_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn parse_status(idx: usize, raw: String) -> rusqlite::Result<RequestStatus> {
    RequestStatus::parse(&raw).ok_or_else(|| conversion_err(idx, format!("unknown request status: {raw}")))
}

fn parse_sports(idx: usize, raw: String) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, format!("bad sports list: {e}")))
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        location: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        favorite_sports: parse_sports(6, row.get::<_, String>(6)?)?,
        created_at: row.get::<_, i64>(7)? as u64,
    })
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<BuddyRequestRow> {
    Ok(BuddyRequestRow {
        id: row.get(0)?,
        from_user: row.get(1)?,
        to_user: row.get(2)?,
        status: parse_status(3, row.get::<_, String>(3)?)?,
        created_at: row.get::<_, i64>(4)? as u64,
        resolved_at: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
    })
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        created_at: row.get::<_, i64>(3)? as u64,
        last_message: row.get(4)?,
        last_message_at: row.get::<_, Option<i64>>(5)?.map(|t| t as u64),
        last_message_by: row.get(6)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        seq: row.get(2)?,
        sender_id: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
    })
}

const USER_COLUMNS: &str =
    "id, first_name, last_name, location, bio, avatar_url, favorite_sports, created_at";
const REQUEST_COLUMNS: &str = "id, from_user, to_user, status, created_at, resolved_at";
const CONVERSATION_COLUMNS: &str =
    "id, user_a, user_b, created_at, last_message, last_message_at, last_message_by";
const MESSAGE_COLUMNS: &str = "id, conversation_id, seq, sender_id, body, created_at";

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database. Used by tests and as the sanctioned
    /// offline backing store.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id              TEXT PRIMARY KEY,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                location        TEXT,
                bio             TEXT,
                avatar_url      TEXT,
                favorite_sports TEXT NOT NULL DEFAULT '[]',
                created_at      INTEGER NOT NULL
            );

            -- Grow-only buddy set, one row per directed edge.  The accept
            -- workflow inserts both directions; INSERT OR IGNORE makes each
            -- insert an idempotent add-if-absent.
            CREATE TABLE IF NOT EXISTS buddies (
                user_id     TEXT NOT NULL,
                buddy_id    TEXT NOT NULL,
                added_at    INTEGER NOT NULL,
                PRIMARY KEY (user_id, buddy_id)
            );

            -- No unique index on (from_user, to_user, status): the duplicate
            -- send check is query-then-insert and two near-simultaneous sends
            -- can both land.  Resolution is by id and tolerates extra rows.
            CREATE TABLE IF NOT EXISTS buddy_requests (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                from_user   TEXT NOT NULL,
                to_user     TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  INTEGER NOT NULL,
                resolved_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_requests_to
                ON buddy_requests(to_user, status);
            CREATE INDEX IF NOT EXISTS idx_requests_from
                ON buddy_requests(from_user, status);

            CREATE TABLE IF NOT EXISTS conversations (
                id              TEXT PRIMARY KEY,
                user_a          TEXT NOT NULL,
                user_b          TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                last_message    TEXT,
                last_message_at INTEGER,
                last_message_by TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_a
                ON conversations(user_a, last_message_at);
            CREATE INDEX IF NOT EXISTS idx_conversations_b
                ON conversations(user_b, last_message_at);

            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                seq             INTEGER NOT NULL,
                sender_id       TEXT NOT NULL,
                body            TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                UNIQUE (conversation_id, seq)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_order
                ON messages(conversation_id, created_at, seq);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert or refresh a user profile.  Rejects ids that would collide
    /// with the conversation id scheme.
    pub fn upsert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        if row.id.is_empty() || row.id.contains(CONVERSATION_ID_SEPARATOR) {
            return Err(StorageError::InvalidId(format!(
                "user id must be non-empty and must not contain '{CONVERSATION_ID_SEPARATOR}': {:?}",
                row.id
            )));
        }
        let sports = serde_json::to_string(&row.favorite_sports)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO users
             (id, first_name, last_name, location, bio, avatar_url, favorite_sports, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                row.id,
                row.first_name,
                row.last_name,
                row.location,
                row.bio,
                row.avatar_url,
                sports,
                row.created_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
        let row = stmt.query_row(params![id], row_to_user).optional()?;
        Ok(row)
    }

    pub fn count_users(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_conversations(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // -----------------------------------------------------------------------
    // Buddy edges
    // -----------------------------------------------------------------------

    /// Add `buddy_id` to `user_id`'s buddy set.  Idempotent: returns true
    /// if the edge was newly inserted, false if it already existed.
    pub fn add_buddy(&self, user_id: &str, buddy_id: &str, now: u64) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO buddies (user_id, buddy_id, added_at) VALUES (?1, ?2, ?3)",
            params![user_id, buddy_id, now as i64],
        )?;
        Ok(affected > 0)
    }

    pub fn is_buddy(&self, user_id: &str, buddy_id: &str) -> Result<bool, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM buddies WHERE user_id = ?1 AND buddy_id = ?2",
            params![user_id, buddy_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_buddy_ids(&self, user_id: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT buddy_id FROM buddies WHERE user_id = ?1 ORDER BY added_at, buddy_id")?;
        let rows = stmt.query_map(params![user_id], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Buddy requests
    // -----------------------------------------------------------------------

    pub fn insert_buddy_request(
        &self,
        from_user: &str,
        to_user: &str,
        now: u64,
    ) -> Result<BuddyRequestRow, StorageError> {
        self.conn.execute(
            "INSERT INTO buddy_requests (from_user, to_user, status, created_at)
             VALUES (?1, ?2, 'pending', ?3)",
            params![from_user, to_user, now as i64],
        )?;
        Ok(BuddyRequestRow {
            id: self.conn.last_insert_rowid(),
            from_user: from_user.to_string(),
            to_user: to_user.to_string(),
            status: RequestStatus::Pending,
            created_at: now,
            resolved_at: None,
        })
    }

    pub fn get_buddy_request(&self, id: i64) -> Result<Option<BuddyRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM buddy_requests WHERE id = ?1"
        ))?;
        let row = stmt.query_row(params![id], row_to_request).optional()?;
        Ok(row)
    }

    /// Most recent pending request for the ordered pair, if any.  Multiple
    /// pending rows can exist for the same pair (see schema comment).
    pub fn find_pending_request(
        &self,
        from_user: &str,
        to_user: &str,
    ) -> Result<Option<BuddyRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM buddy_requests
             WHERE from_user = ?1 AND to_user = ?2 AND status = 'pending'
             ORDER BY created_at DESC, id DESC LIMIT 1"
        ))?;
        let row = stmt
            .query_row(params![from_user, to_user], row_to_request)
            .optional()?;
        Ok(row)
    }

    /// Transition a request out of `pending`.  Conditional on the current
    /// status, so a lost race returns false instead of double-resolving.
    pub fn resolve_buddy_request(
        &self,
        id: i64,
        status: RequestStatus,
        now: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE buddy_requests SET status = ?1, resolved_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![status.as_str(), now as i64, id],
        )?;
        Ok(affected > 0)
    }

    pub fn list_incoming_pending(&self, to_user: &str) -> Result<Vec<BuddyRequestRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REQUEST_COLUMNS} FROM buddy_requests
             WHERE to_user = ?1 AND status = 'pending'
             ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![to_user], row_to_request)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Distinct user ids the given user has a pending outbound request toward.
    pub fn list_outgoing_pending_targets(&self, from_user: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT to_user FROM buddy_requests
             WHERE from_user = ?1 AND status = 'pending'
             ORDER BY to_user",
        )?;
        let rows = stmt.query_map(params![from_user], |row| row.get(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// Create the conversation if no row with its id exists yet.  Returns
    /// true if this call created it.  Concurrent callers derive the same id,
    /// so the loser's insert is a harmless no-op.
    pub fn create_conversation_if_absent(&self, row: &ConversationRow) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO conversations
             (id, user_a, user_b, created_at, last_message, last_message_at, last_message_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.id,
                row.user_a,
                row.user_b,
                row.created_at as i64,
                row.last_message,
                row.last_message_at.map(|t| t as i64),
                row.last_message_by,
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
        ))?;
        let row = stmt.query_row(params![id], row_to_conversation).optional()?;
        Ok(row)
    }

    /// All conversations the user participates in, most recent activity
    /// first.  Conversations without messages sort by creation time.
    pub fn list_conversations_for(&self, user_id: &str) -> Result<Vec<ConversationRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE user_a = ?1 OR user_b = ?1
             ORDER BY COALESCE(last_message_at, created_at) DESC, id"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_conversation)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Update the denormalized last-message summary.  A separate write from
    /// the append itself, mirroring the store contract's caveat that the
    /// two are not atomic.
    pub fn update_conversation_summary(
        &self,
        id: &str,
        last_message: &str,
        last_message_by: &str,
        last_message_at: u64,
    ) -> Result<bool, StorageError> {
        let affected = self.conn.execute(
            "UPDATE conversations
             SET last_message = ?1, last_message_at = ?2, last_message_by = ?3
             WHERE id = ?4",
            params![last_message, last_message_at as i64, last_message_by, id],
        )?;
        Ok(affected > 0)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Append a message to a conversation's ledger.  The timestamp is
    /// server-assigned and clamped to never run backwards within the
    /// conversation; `seq` is the arrival counter that breaks timestamp
    /// ties.  Both are assigned inside one transaction.
    pub fn append_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRow, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let (max_seq, max_ts): (i64, i64) = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0), COALESCE(MAX(created_at), 0)
             FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let row = MessageRow {
            id: new_message_id(),
            conversation_id: conversation_id.to_string(),
            seq: max_seq + 1,
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: now_millis().max(max_ts as u64),
        };
        tx.execute(
            "INSERT INTO messages (id, conversation_id, seq, sender_id, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.id,
                row.conversation_id,
                row.seq,
                row.sender_id,
                row.body,
                row.created_at as i64,
            ],
        )?;
        tx.commit()?;
        Ok(row)
    }

    /// All messages in a conversation, ascending by timestamp with arrival
    /// order breaking ties.
    pub fn list_messages(&self, conversation_id: &str) -> Result<Vec<MessageRow>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, seq ASC"
        ))?;
        let rows = stmt.query_map(params![conversation_id], row_to_message)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }
}
