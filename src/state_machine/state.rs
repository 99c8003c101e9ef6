//! Message lifecycle state types

use crate::db::{Conversation, ConversationId, Message, MessageId, Role};
use chrono::{DateTime, Utc};
use std::fmt;

/// Correlates the provisional entries of one exchange with its result.
///
/// `seq` comes from a per-session counter that is never reset, so a token
/// issued before a reload can never match an entry created after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeToken {
    pub conversation_id: ConversationId,
    pub seq: u64,
}

impl fmt::Display for ExchangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.conversation_id, self.seq)
    }
}

/// Position of a provisional entry within its exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    User,
    Assistant,
}

/// Identity of a timeline entry.
///
/// Durable ids and local keys are separate key spaces and are never compared
/// with each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKey {
    Durable { id: MessageId },
    Local { token: ExchangeToken, slot: Slot },
}

impl EntryKey {
    pub fn token(&self) -> Option<ExchangeToken> {
        match self {
            EntryKey::Durable { .. } => None,
            EntryKey::Local { token, .. } => Some(*token),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    /// Store-issued entry with a durable id
    Confirmed,
    /// Optimistic user entry, exchange in flight
    Sending,
    /// Assistant placeholder, no content yet
    Pending,
    /// User entry whose exchange failed
    Unsent,
    /// Synthetic assistant entry carrying an error text
    Error,
}

/// One visible entry of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub key: EntryKey,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl MessageView {
    pub fn confirmed(message: &Message) -> Self {
        Self {
            key: EntryKey::Durable { id: message.id },
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp,
            status: MessageStatus::Confirmed,
        }
    }

    pub fn local(
        token: ExchangeToken,
        slot: Slot,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
        status: MessageStatus,
    ) -> Self {
        let role = match slot {
            Slot::User => Role::User,
            Slot::Assistant => Role::Assistant,
        };
        Self {
            key: EntryKey::Local { token, slot },
            role,
            content: content.into(),
            timestamp,
            status,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn is_provisional(&self) -> bool {
        matches!(self.key, EntryKey::Local { .. })
    }
}

/// Ordered message sequence.
///
/// Entries are kept sorted by timestamp, ties broken by insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    entries: Vec<MessageView>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: &[Message]) -> Self {
        let mut timeline = Self::new();
        for message in messages {
            timeline.insert(MessageView::confirmed(message));
        }
        timeline
    }

    /// Insert after every entry with a timestamp not later than the new one
    pub fn insert(&mut self, view: MessageView) {
        let idx = self
            .entries
            .partition_point(|e| e.timestamp <= view.timestamp);
        self.entries.insert(idx, view);
    }

    /// Remove every entry tagged with `token`, returning them in order
    pub fn remove_token(&mut self, token: ExchangeToken) -> Vec<MessageView> {
        let (removed, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.key.token() == Some(token));
        self.entries = kept;
        removed
    }

    pub fn remove(&mut self, key: EntryKey) -> Option<MessageView> {
        let idx = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(idx))
    }

    pub fn get_mut(&mut self, key: EntryKey) -> Option<&mut MessageView> {
        self.entries.iter_mut().find(|e| e.key == key)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.entries.last().map(|e| e.timestamp)
    }

    pub fn entries(&self) -> &[MessageView] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lifecycle of the most recent exchange
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExchangeState {
    #[default]
    Idle,
    /// Provisional entries are visible, transport call outstanding
    Optimistic { token: ExchangeToken },
    Confirmed { token: ExchangeToken },
    Failed { token: ExchangeToken, message: String },
}

impl ExchangeState {
    pub fn in_flight(&self) -> Option<ExchangeToken> {
        match self {
            ExchangeState::Optimistic { token } => Some(*token),
            _ => None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight().is_some()
    }
}

/// Everything the engine knows about the open conversation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    pub conversation: Option<Conversation>,
    pub timeline: Timeline,
    pub exchange: ExchangeState,
    /// Next correlation sequence number. Survives conversation switches.
    pub next_seq: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.conversation.as_ref().map(|c| c.id)
    }
}
