//! SQLite-backed storage adapter

use super::{ConversationStore, MessageStore, StoreError};
use crate::db::{
    Conversation, ConversationId, ConversationWithMessages, Database, DbError, Message, Role,
};
use async_trait::async_trait;
use serde_json::Value;

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationStore for DatabaseStorage {
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        let conversation = match self.db.get_conversation(id) {
            Ok(c) => c,
            Err(DbError::ConversationNotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let messages = self.db.get_messages(id)?;
        Ok(Some(ConversationWithMessages {
            conversation,
            messages,
        }))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Ok(self.db.list_conversations()?)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        Ok(self.db.create_conversation(title)?)
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        Ok(self.db.delete_conversation(id)?)
    }
}

#[async_trait]
impl MessageStore for DatabaseStorage {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<Message, StoreError> {
        Ok(self
            .db
            .add_message(conversation_id, role, content, metadata)?)
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        Ok(self.db.get_messages(conversation_id)?)
    }
}
