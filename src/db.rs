//! Database module for help-ai
//!
//! Provides persistence for conversations and messages.

mod schema;

pub use schema::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Conversation Operations ====================

    /// Create a new conversation
    pub fn create_conversation(&self, title: &str) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = now_micros();

        conn.execute(
            "INSERT INTO conversations (title, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![title, format_datetime(&now)],
        )?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get conversation by ID
    pub fn get_conversation(&self, id: ConversationId) -> DbResult<Conversation> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?1",
            params![id],
            parse_conversation_row,
        )
        .optional()?
        .ok_or(DbError::ConversationNotFound(id))
    }

    /// List conversations, most recently updated first
    pub fn list_conversations(&self) -> DbResult<Vec<Conversation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, title, created_at, updated_at FROM conversations
             ORDER BY updated_at DESC, id DESC",
        )?;

        let rows = stmt.query_map([], parse_conversation_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Delete a conversation and all its messages.
    ///
    /// Returns `false` when no conversation had that id.
    pub fn delete_conversation(&self, id: ConversationId) -> DbResult<bool> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![id],
        )?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;

        Ok(deleted > 0)
    }

    // ==================== Message Operations ====================

    /// Add a message to a conversation and advance the conversation's `updated_at`
    pub fn add_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> DbResult<Message> {
        let conn = self.conn.lock().unwrap();
        let now = now_micros();
        let stamp = format_datetime(&now);

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM conversations WHERE id = ?1)",
            params![conversation_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::ConversationNotFound(conversation_id));
        }

        let metadata_str = metadata.map(Value::to_string);

        conn.execute(
            "INSERT INTO messages (conversation_id, role, content, metadata, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![conversation_id, role.as_str(), content, metadata_str, stamp],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![stamp, conversation_id],
        )?;

        Ok(Message {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            timestamp: now,
            metadata: metadata.cloned(),
        })
    }

    /// Get messages for a conversation, oldest first
    pub fn get_messages(&self, conversation_id: ConversationId) -> DbResult<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, metadata, timestamp
             FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(params![conversation_id], parse_message_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn parse_conversation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_datetime(&row.get::<_, String>(2)?),
        updated_at: parse_datetime(&row.get::<_, String>(3)?),
    })
}

/// Parse a message row from the database
fn parse_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    // Unknown roles can only come from hand-edited rows; show them as system notes
    let role = row
        .get::<_, String>(2)?
        .parse()
        .unwrap_or(Role::System);

    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        metadata: row
            .get::<_, Option<String>>(4)?
            .and_then(|s| serde_json::from_str(&s).ok()),
        timestamp: parse_datetime(&row.get::<_, String>(5)?),
    })
}

/// Current time at the precision the database stores
fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
