//! Assistant backends
//!
//! Produce the assistant's reply for a conversation history.

mod openai;

pub use openai::OpenAiAssistant;

use crate::config::AssistantConfig;
use crate::db::{Message, Role};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Assistant error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AssistantError {
    pub kind: AssistantErrorKind,
    pub message: String,
}

impl AssistantError {
    pub fn new(kind: AssistantErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AssistantErrorKind::Unknown, message)
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantErrorKind {
    /// Connection failures and timeouts
    Network,
    /// 429
    RateLimit,
    /// 5xx
    ServerError,
    /// 401, 403
    Auth,
    /// 400
    InvalidRequest,
    Unknown,
}

/// Common interface for assistant backends
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Reply to the last user message, given the full ordered history
    async fn reply(&self, history: &[Message]) -> Result<String, AssistantError>;

    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: Assistant + ?Sized> Assistant for Arc<T> {
    async fn reply(&self, history: &[Message]) -> Result<String, AssistantError> {
        (**self).reply(history).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for assistant backends
pub struct LoggingAssistant {
    inner: Arc<dyn Assistant>,
    model_id: String,
}

impl LoggingAssistant {
    pub fn new(inner: Arc<dyn Assistant>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl Assistant for LoggingAssistant {
    async fn reply(&self, history: &[Message]) -> Result<String, AssistantError> {
        let start = std::time::Instant::now();
        let result = self.inner.reply(history).await;
        let duration = start.elapsed();

        match &result {
            Ok(text) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    history_len = history.len(),
                    reply_chars = text.chars().count(),
                    "Assistant reply completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "Assistant reply failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Offline assistant that repeats the user's last message back
pub struct EchoAssistant;

#[async_trait]
impl Assistant for EchoAssistant {
    async fn reply(&self, history: &[Message]) -> Result<String, AssistantError> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .ok_or_else(|| AssistantError::invalid_request("No user message to reply to"))?;
        Ok(format!("You said: {}", last.content.trim()))
    }

    fn model_id(&self) -> &'static str {
        "echo"
    }
}

/// Build the assistant described by configuration, wrapped with logging
pub fn build_assistant(config: &AssistantConfig) -> Result<Arc<dyn Assistant>, AssistantError> {
    let inner: Arc<dyn Assistant> = match &config.api_key {
        Some(key) => Arc::new(OpenAiAssistant::new(config, key.clone())?),
        None => {
            tracing::warn!("No assistant API key configured. Set ASSISTANT_API_KEY; using echo assistant.");
            Arc::new(EchoAssistant)
        }
    };
    Ok(Arc::new(LoggingAssistant::new(inner)))
}
