//! Runtime for chat sessions
//!
//! Runs the effects emitted by the state machine against a conversation
//! store and a chat transport, and streams changes to subscribers.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::ChatSession;

use crate::db::{Conversation, ConversationId};
use crate::state_machine::{MessageView, Notification};
use crate::transport::Exchange;
use std::fmt;
use thiserror::Error;

/// Who is driving the session. Absence is a normal configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User { id: String, username: String },
    Guest,
}

impl Identity {
    pub fn is_guest(&self) -> bool {
        matches!(self, Identity::Guest)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::User { id, username } => write!(f, "user:{username}#{id}"),
            Identity::Guest => write!(f, "guest"),
        }
    }
}

/// Errors surfaced by session operations.
///
/// Transport failures are not errors here; they become the failed exchange
/// state plus a notification.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Conversation not found: {0}")]
    NotFound(ConversationId),
    #[error("Failed to load conversation: {0}")]
    LoadFailed(String),
    #[error("Failed to create a new conversation: {0}")]
    CreateFailed(String),
    #[error("A message is already being sent")]
    Busy,
}

/// How a send ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Blank content or no open conversation; nothing happened
    Skipped,
    Confirmed(Exchange),
    Failed { message: String },
    /// The result arrived after the user switched conversations
    Discarded,
}

/// Changes streamed to subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    TimelineChanged(Vec<MessageView>),
    LoadingChanged(bool),
    ConversationChanged(Option<Conversation>),
    Notification(Notification),
}
