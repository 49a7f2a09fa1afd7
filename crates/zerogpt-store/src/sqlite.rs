//! SQLite history store
//!
//! One `chat_history` row per message. Images and audio are not persisted.
//! Timestamps are stored as fixed-width UTC RFC 3339 so they sort as text.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, warn};
use zerogpt_core::config::Settings;
use zerogpt_core::error::{AgentError, Result};
use zerogpt_core::message::{History, Message, Name, Role};
use zerogpt_core::store::HistoryStore;

/// Conversation history persisted in SQLite
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
    limit: usize,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &Path, limit: usize) -> Result<Self> {
        info!("opening history store at {}", db_path.display());
        let conn = Connection::open(db_path).map_err(storage("failed to open database"))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(storage("failed to set pragmas"))?;

        Self::with_connection(conn, limit)
    }

    pub fn in_memory(limit: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(storage("failed to open in-memory database"))?;
        Self::with_connection(conn, limit)
    }

    /// Open the database and limit named by the settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::open(&settings.db_path, settings.message_history_limit)
    }

    fn with_connection(conn: Connection, limit: usize) -> Result<Self> {
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            limit,
        })
    }

    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Number of stored rows for a user, ignoring the load limit
    pub fn count(&self, user_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM chat_history WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(storage("failed to count messages"))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AgentError::Storage("history connection lock poisoned".into()))
    }
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chat_history (
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            name TEXT,
            include_in_history INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chat_history_user
            ON chat_history(user_id, created_at);",
    )
    .map_err(storage("migration failed"))
}

fn storage(context: &'static str) -> impl Fn(rusqlite::Error) -> AgentError {
    move |e| AgentError::Storage(format!("{context}: {e}"))
}

/// Raw row before validation
struct StoredRow {
    role: String,
    content: String,
    name: Option<String>,
    include_in_history: bool,
    created_at: String,
}

impl StoredRow {
    fn into_message(self) -> Result<Message> {
        let role: Role = self
            .role
            .parse()
            .map_err(|_| AgentError::Storage(format!("unknown role in history: {}", self.role)))?;

        let mut message =
            Message::new(role, self.content).with_created_at(parse_timestamp(&self.created_at));
        message.name = self.name.map(Name::new).transpose()?;
        message.include_in_history = self.include_in_history;
        Ok(message)
    }
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(
        |e| {
            warn!("unparseable history timestamp {raw:?}: {e}");
            Utc::now()
        },
        |ts| ts.with_timezone(&Utc),
    )
}

impl HistoryStore for SqliteHistoryStore {
    fn load(&self, user_id: &str) -> Result<History> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, name, include_in_history, created_at
                 FROM chat_history
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2",
            )
            .map_err(storage("failed to prepare history query"))?;

        let limit = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                Ok(StoredRow {
                    role: row.get(0)?,
                    content: row.get(1)?,
                    name: row.get(2)?,
                    include_in_history: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .map_err(storage("failed to load history"))?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row.map_err(storage("failed to read history row"))?.into_message()?);
        }
        messages.reverse();

        debug!(user = user_id, count = messages.len(), "history loaded");
        Ok(History::from_messages(messages))
    }

    fn save(&self, user_id: &str, messages: &[Message]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(storage("failed to begin transaction"))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO chat_history
                        (user_id, role, content, name, include_in_history, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(storage("failed to prepare insert"))?;

            for message in messages {
                stmt.execute(params![
                    user_id,
                    message.role.as_str(),
                    message.content,
                    message.name.as_ref().map(Name::as_str),
                    message.include_in_history,
                    message.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ])
                .map_err(storage("failed to append message"))?;
            }
        }

        tx.commit().map_err(storage("failed to commit messages"))?;
        debug!(user = user_id, count = messages.len(), "history saved");
        Ok(())
    }
}
