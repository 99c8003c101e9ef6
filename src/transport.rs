//! Chat exchange transport
//!
//! One call sends a user message and returns the two durable records the
//! server created for it.

mod local;

pub use local::LocalTransport;

use crate::db::{ConversationId, Message};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Result of one successful round trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exchange {
    pub user_message: Message,
    pub assistant_message: Message,
}

/// Transport error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::InvalidRequest, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Upstream, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Network,
    Timeout,
    NotFound,
    InvalidRequest,
    /// The assistant backend failed
    Upstream,
    Unknown,
}

/// Sends user messages and returns the confirmed pair
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError>;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError> {
        (**self).exchange(conversation_id, content).await
    }
}
