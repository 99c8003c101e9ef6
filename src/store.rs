//! Conversation storage abstraction
//!
//! One trait pair, two concrete backends. The backend is picked once at
//! process start from configuration and never inspected per call.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::DatabaseStorage;

use crate::config::StoreBackend;
use crate::db::{
    Conversation, ConversationId, ConversationWithMessages, Database, DbError, Message, Role,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by any storage backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    #[error(transparent)]
    Database(DbError),
    #[error("Storage request failed: {0}")]
    Http(String),
    #[error("Malformed storage response: {0}")]
    Decode(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ConversationNotFound(id) => StoreError::ConversationNotFound(id),
            other => StoreError::Database(other),
        }
    }
}

/// Conversation records
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation and its messages ordered by time.
    /// `Ok(None)` when there is no such conversation.
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError>;

    /// All conversations, most recently updated first
    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError>;

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError>;

    /// Returns `false` when nothing was deleted
    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError>;
}

/// Messages inside conversations
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message. The store stamps id and timestamp and advances the
    /// owning conversation's `updated_at`.
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<Message, StoreError>;

    /// Messages for a conversation ordered by time
    async fn list_messages(&self, conversation_id: ConversationId)
        -> Result<Vec<Message>, StoreError>;
}

/// Combined storage trait for convenience
pub trait Storage: ConversationStore + MessageStore {}
impl<T: ConversationStore + MessageStore + ?Sized> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: ConversationStore + ?Sized> ConversationStore for Arc<T> {
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        (**self).get_conversation(id).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        (**self).list_conversations().await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        (**self).create_conversation(title).await
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        (**self).delete_conversation(id).await
    }
}

#[async_trait]
impl<T: MessageStore + ?Sized> MessageStore for Arc<T> {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<Message, StoreError> {
        (**self)
            .create_message(conversation_id, role, content, metadata)
            .await
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        (**self).list_messages(conversation_id).await
    }
}

/// Open the storage backend selected by configuration
pub fn open_storage(backend: &StoreBackend) -> Result<Arc<dyn Storage>, StoreError> {
    match backend {
        StoreBackend::Sqlite { path } => {
            if let Some(parent) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %e, "Could not create database directory");
                }
            }
            tracing::info!(path = %path.display(), "Opening SQLite store");
            let db = Database::open(path)?;
            Ok(Arc::new(DatabaseStorage::new(db)))
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(MemoryStorage::new()))
        }
    }
}
