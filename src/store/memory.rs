//! In-memory storage, used by serverless deployments and tests

use super::{ConversationStore, MessageStore, StoreError};
use crate::db::{
    Conversation, ConversationId, ConversationWithMessages, Message, MessageId, Role,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    next_conversation_id: ConversationId,
    next_message_id: MessageId,
}

/// Process-local storage. Nothing survives a restart.
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables {
                next_conversation_id: 1,
                next_message_id: 1,
                ..Tables::default()
            }),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryStorage {
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .get(&id)
            .map(|conversation| ConversationWithMessages {
                conversation: conversation.clone(),
                messages: tables.messages.get(&id).cloned().unwrap_or_default(),
            }))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut conversations: Vec<Conversation> =
            tables.conversations.values().cloned().collect();
        conversations.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(conversations)
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.next_conversation_id;
        tables.next_conversation_id += 1;

        let now = Utc::now();
        let conversation = Conversation {
            id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        tables.conversations.insert(id, conversation.clone());
        Ok(conversation)
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        tables.messages.remove(&id);
        Ok(tables.conversations.remove(&id).is_some())
    }
}

#[async_trait]
impl MessageStore for MemoryStorage {
    async fn create_message(
        &self,
        conversation_id: ConversationId,
        role: Role,
        content: &str,
        metadata: Option<&Value>,
    ) -> Result<Message, StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.conversations.contains_key(&conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id));
        }

        let id = tables.next_message_id;
        tables.next_message_id += 1;

        // Never stamp earlier than the current tail, even if the wall clock stepped back
        let tail = tables
            .messages
            .get(&conversation_id)
            .and_then(|msgs| msgs.last())
            .map(|m| m.timestamp);
        let now = Utc::now();
        let timestamp = tail.map_or(now, |t| t.max(now));

        let message = Message {
            id,
            conversation_id,
            role,
            content: content.to_string(),
            timestamp,
            metadata: metadata.cloned(),
        };

        tables
            .messages
            .entry(conversation_id)
            .or_default()
            .push(message.clone());
        if let Some(conversation) = tables.conversations.get_mut(&conversation_id) {
            conversation.updated_at = timestamp;
        }

        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.lock().unwrap();
        if !tables.conversations.contains_key(&conversation_id) {
            return Err(StoreError::ConversationNotFound(conversation_id));
        }
        Ok(tables
            .messages
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
