//! Events that drive the message lifecycle

use super::state::ExchangeToken;
use crate::db::{Conversation, Message};
use crate::transport::Exchange;
use chrono::{DateTime, Utc};

/// Events that can occur in a chat session
#[derive(Debug, Clone)]
pub enum Event {
    /// A conversation was loaded or created; replaces the view wholesale
    ConversationOpened {
        conversation: Conversation,
        messages: Vec<Message>,
    },

    /// User submitted a message
    UserMessage {
        text: String,
        sent_at: DateTime<Utc>,
    },

    /// Transport returned the confirmed pair
    ExchangeSucceeded {
        token: ExchangeToken,
        exchange: Exchange,
    },

    /// Transport call failed
    ExchangeFailed {
        token: ExchangeToken,
        message: String,
        failed_at: DateTime<Utc>,
    },
}
