//! Message lifecycle state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.
//! Optimistic entries are keyed by an exchange token and reconciled with the
//! server-confirmed pair, or with an error entry, when the exchange resolves.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, Notification, NotificationVariant};
pub use event::Event;
pub use state::{
    ChatState, EntryKey, ExchangeState, ExchangeToken, MessageStatus, MessageView, Slot,
    Timeline,
};
pub use transition::{
    transition, TransitionError, TransitionResult, EXCHANGE_ERROR_REPLY, SEND_FAILED_NOTICE,
};
