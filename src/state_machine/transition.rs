//! Pure state transition function
//!
//! Given the same state and event, `transition` always produces the same
//! result. Clock readings arrive inside events.

use super::effect::Notification;
use super::state::{
    ChatState, EntryKey, ExchangeState, ExchangeToken, MessageStatus, MessageView, Slot,
    Timeline,
};
use super::{Effect, Event};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Synthetic assistant text shown when an exchange fails
pub const EXCHANGE_ERROR_REPLY: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// Toast shown when an exchange fails
pub const SEND_FAILED_NOTICE: &str = "Failed to send message. Please try again.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A message is already being sent")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("No conversation is open")]
    NoConversation,
    #[error("Result for exchange {0} is no longer expected")]
    StaleExchange(ExchangeToken),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(state: &ChatState, event: Event) -> Result<TransitionResult, TransitionError> {
    match event {
        Event::ConversationOpened {
            conversation,
            messages,
        } => {
            // An exchange in flight for another conversation becomes stale.
            // Reopening its own conversation keeps it pending on top of the
            // stored history. next_seq carries over either way.
            let mut timeline = Timeline::from_messages(&messages);
            let exchange = match state.exchange.in_flight() {
                Some(token) if token.conversation_id == conversation.id => {
                    for view in state
                        .timeline
                        .entries()
                        .iter()
                        .filter(|e| e.key.token() == Some(token))
                    {
                        timeline.insert(view.clone());
                    }
                    ExchangeState::Optimistic { token }
                }
                _ => ExchangeState::Idle,
            };
            let new_state = ChatState {
                conversation: Some(conversation),
                timeline,
                exchange,
                next_seq: state.next_seq,
            };
            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishConversation)
                .with_effect(Effect::PublishTimeline))
        }

        Event::UserMessage { text, sent_at } => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            let conversation_id = state
                .conversation_id()
                .ok_or(TransitionError::NoConversation)?;
            if state.exchange.is_in_flight() {
                return Err(TransitionError::Busy);
            }

            let token = ExchangeToken {
                conversation_id,
                seq: state.next_seq,
            };
            let mut new_state = state.clone();
            new_state.next_seq += 1;
            new_state.exchange = ExchangeState::Optimistic { token };

            let at = not_before_tail(&new_state.timeline, sent_at);
            new_state.timeline.insert(MessageView::local(
                token,
                Slot::User,
                text.clone(),
                at,
                MessageStatus::Sending,
            ));
            new_state.timeline.insert(MessageView::local(
                token,
                Slot::Assistant,
                "",
                at,
                MessageStatus::Pending,
            ));

            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishTimeline)
                .with_effect(Effect::RequestExchange {
                    token,
                    conversation_id,
                    content: text,
                }))
        }

        Event::ExchangeSucceeded { token, exchange } => {
            expect_in_flight(state, token)?;

            let mut new_state = state.clone();
            new_state.timeline.remove_token(token);
            // A reload during the exchange may already show the stored pair
            for id in [exchange.user_message.id, exchange.assistant_message.id] {
                new_state.timeline.remove(EntryKey::Durable { id });
            }
            new_state
                .timeline
                .insert(MessageView::confirmed(&exchange.user_message));
            new_state
                .timeline
                .insert(MessageView::confirmed(&exchange.assistant_message));
            if let Some(conversation) = new_state.conversation.as_mut() {
                conversation.updated_at = conversation
                    .updated_at
                    .max(exchange.assistant_message.timestamp);
            }
            new_state.exchange = ExchangeState::Confirmed { token };

            Ok(TransitionResult::new(new_state).with_effect(Effect::PublishTimeline))
        }

        Event::ExchangeFailed {
            token,
            message,
            failed_at,
        } => {
            expect_in_flight(state, token)?;

            let mut new_state = state.clone();
            new_state.timeline.remove(placeholder_key(token));
            let user = new_state
                .timeline
                .get_mut(EntryKey::Local {
                    token,
                    slot: Slot::User,
                })
                .ok_or_else(|| {
                    TransitionError::InvalidTransition(format!(
                        "user entry for exchange {token} is missing"
                    ))
                })?;
            user.status = MessageStatus::Unsent;

            let at = not_before_tail(&new_state.timeline, failed_at);
            new_state.timeline.insert(MessageView::local(
                token,
                Slot::Assistant,
                EXCHANGE_ERROR_REPLY,
                at,
                MessageStatus::Error,
            ));
            new_state.exchange = ExchangeState::Failed { token, message };

            Ok(TransitionResult::new(new_state)
                .with_effect(Effect::PublishTimeline)
                .with_effect(Effect::Notify(Notification::destructive(
                    "Error",
                    SEND_FAILED_NOTICE,
                ))))
        }
    }
}

fn expect_in_flight(state: &ChatState, token: ExchangeToken) -> Result<(), TransitionError> {
    if state.exchange.in_flight() == Some(token) {
        Ok(())
    } else {
        Err(TransitionError::StaleExchange(token))
    }
}

fn placeholder_key(token: ExchangeToken) -> EntryKey {
    EntryKey::Local {
        token,
        slot: Slot::Assistant,
    }
}

/// Local entries are appended, even if the local clock runs behind the server
fn not_before_tail(timeline: &Timeline, at: DateTime<Utc>) -> DateTime<Utc> {
    timeline.last_timestamp().map_or(at, |tail| tail.max(at))
}
