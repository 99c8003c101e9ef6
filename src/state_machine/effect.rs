//! Effects produced by state transitions

use super::state::ExchangeToken;
use crate::db::ConversationId;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send the user's message through the transport
    RequestExchange {
        token: ExchangeToken,
        conversation_id: ConversationId,
        content: String,
    },

    /// Timeline changed; subscribers should re-render
    PublishTimeline,

    /// The open conversation changed
    PublishConversation,

    /// Side-channel toast
    Notify(Notification),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// Transient user-facing notice, separate from the timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }
}
