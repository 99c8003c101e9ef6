//! Server-side transport: persist, ask the assistant, persist the reply

use super::{ChatTransport, Exchange, TransportError};
use crate::assistant::Assistant;
use crate::db::{ConversationId, Role};
use crate::store::{Storage, StoreError};
use async_trait::async_trait;

pub struct LocalTransport<S, A> {
    storage: S,
    assistant: A,
}

impl<S: Storage, A: Assistant> LocalTransport<S, A> {
    pub fn new(storage: S, assistant: A) -> Self {
        Self { storage, assistant }
    }
}

impl From<StoreError> for TransportError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConversationNotFound(id) => {
                TransportError::not_found(format!("Conversation not found: {id}"))
            }
            other => TransportError::unknown(other.to_string()),
        }
    }
}

#[async_trait]
impl<S: Storage, A: Assistant> ChatTransport for LocalTransport<S, A> {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError> {
        if content.trim().is_empty() {
            return Err(TransportError::invalid_request("Message cannot be empty"));
        }

        // Persisting into a missing conversation reports NotFound
        let user_message = self
            .storage
            .create_message(conversation_id, Role::User, content, None)
            .await?;

        let history = self.storage.list_messages(conversation_id).await?;
        let reply = self.assistant.reply(&history).await.map_err(|e| {
            tracing::warn!(
                conv_id = %conversation_id,
                user_message_id = user_message.id,
                error = %e,
                "Assistant failed; user message stays persisted"
            );
            TransportError::upstream(format!("Assistant failed: {}", e.message))
        })?;

        let metadata = serde_json::json!({ "model": self.assistant.model_id() });
        let assistant_message = self
            .storage
            .create_message(conversation_id, Role::Assistant, &reply, Some(&metadata))
            .await?;

        tracing::debug!(
            conv_id = %conversation_id,
            user_message_id = user_message.id,
            assistant_message_id = assistant_message.id,
            "Exchange persisted"
        );

        Ok(Exchange {
            user_message,
            assistant_message,
        })
    }
}
