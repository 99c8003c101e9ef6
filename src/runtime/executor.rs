//! Chat session executor

use super::{Identity, SendOutcome, SessionError, SessionEvent};
use crate::db::{Conversation, ConversationId, Message, DEFAULT_CONVERSATION_TITLE};
use crate::state_machine::{
    transition, ChatState, Effect, Event, ExchangeState, MessageView, Notification,
    TransitionError,
};
use crate::store::ConversationStore;
use crate::transport::ChatTransport;
use chrono::Utc;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::Instrument;

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct SessionInner {
    state: ChatState,
    /// Store calls in progress; loading while non-zero
    loads_in_flight: usize,
}

/// One view onto one conversation at a time.
///
/// The state lock is only held for the pure transition, never across a store
/// or transport call, so observers never block on I/O.
pub struct ChatSession<S, T>
where
    S: ConversationStore,
    T: ChatTransport,
{
    store: S,
    transport: T,
    identity: Option<Identity>,
    inner: Mutex<SessionInner>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    span: tracing::Span,
}

impl<S, T> ChatSession<S, T>
where
    S: ConversationStore,
    T: ChatTransport,
{
    pub fn new(store: S, transport: T, identity: Option<Identity>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let who = identity
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), ToString::to_string);
        Self {
            store,
            transport,
            identity,
            inner: Mutex::new(SessionInner {
                state: ChatState::new(),
                loads_in_flight: 0,
            }),
            broadcast_tx,
            span: tracing::info_span!("chat_session", identity = %who),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcast_tx.subscribe()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn messages(&self) -> Vec<MessageView> {
        self.inner.lock().unwrap().state.timeline.entries().to_vec()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().unwrap().loads_in_flight > 0
    }

    pub fn conversation(&self) -> Option<Conversation> {
        self.inner.lock().unwrap().state.conversation.clone()
    }

    pub fn exchange_state(&self) -> ExchangeState {
        self.inner.lock().unwrap().state.exchange.clone()
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Replace the view with a stored conversation
    pub async fn load_conversation(&self, id: ConversationId) -> Result<(), SessionError> {
        async {
            self.begin_loading();
            let result = self.store.get_conversation(id).await;
            let outcome = match result {
                Ok(Some(data)) => {
                    tracing::info!(
                        conv_id = %id,
                        messages = data.messages.len(),
                        "Conversation loaded"
                    );
                    self.open(data.conversation, data.messages).await;
                    Ok(())
                }
                Ok(None) => {
                    tracing::warn!(conv_id = %id, "Conversation not found");
                    self.notify(Notification::destructive("Error", "Failed to load conversation"));
                    Err(SessionError::NotFound(id))
                }
                Err(e) => {
                    tracing::error!(conv_id = %id, error = %e, "Failed to load conversation");
                    self.notify(Notification::destructive("Error", "Failed to load conversation"));
                    Err(SessionError::LoadFailed(e.to_string()))
                }
            };
            self.end_loading();
            outcome
        }
        .instrument(self.span.clone())
        .await
    }

    /// Create a conversation and open it with an empty timeline
    pub async fn start_new_conversation(
        &self,
        title: Option<&str>,
    ) -> Result<ConversationId, SessionError> {
        async {
            let title = title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_CONVERSATION_TITLE);

            self.begin_loading();
            let result = self.store.create_conversation(title).await;
            let outcome = match result {
                Ok(conversation) => {
                    let id = conversation.id;
                    tracing::info!(conv_id = %id, title = %conversation.title, "Conversation created");
                    self.open(conversation, Vec::new()).await;
                    Ok(id)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create conversation");
                    self.notify(Notification::destructive(
                        "Error",
                        "Failed to create a new conversation",
                    ));
                    Err(SessionError::CreateFailed(e.to_string()))
                }
            };
            self.end_loading();
            outcome
        }
        .instrument(self.span.clone())
        .await
    }

    /// Send a message in the open conversation.
    ///
    /// Resolves once the exchange has been reconciled. Only a concurrent send
    /// is an error; transport failures come back as `SendOutcome::Failed`.
    pub async fn send_user_message(&self, content: &str) -> Result<SendOutcome, SessionError> {
        let event = Event::UserMessage {
            text: content.to_string(),
            sent_at: Utc::now(),
        };

        match self.process_event(event).instrument(self.span.clone()).await {
            Ok(outcome) => Ok(outcome.unwrap_or(SendOutcome::Skipped)),
            Err(TransitionError::EmptyMessage | TransitionError::NoConversation) => {
                tracing::debug!("Nothing to send");
                Ok(SendOutcome::Skipped)
            }
            Err(TransitionError::Busy) => {
                tracing::info!("Rejected send while an exchange is in flight");
                self.notify(Notification::destructive(
                    "Please wait",
                    "A message is already being sent.",
                ));
                Err(SessionError::Busy)
            }
            Err(e) => {
                // Only reconciliation events can produce the other variants
                tracing::error!(error = %e, "Unexpected transition error on send");
                Ok(SendOutcome::Failed {
                    message: e.to_string(),
                })
            }
        }
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    async fn open(&self, conversation: Conversation, messages: Vec<Message>) {
        let event = Event::ConversationOpened {
            conversation,
            messages,
        };
        if let Err(e) = self.process_event(event).await {
            tracing::error!(error = %e, "Failed to open conversation");
        }
    }

    /// Apply an event and run its effects until no follow-up events remain.
    ///
    /// Returns the outcome of the exchange resolved along the way, if any.
    async fn process_event(&self, event: Event) -> Result<Option<SendOutcome>, TransitionError> {
        let mut outcome = None;
        let mut events_to_process = vec![event];
        let mut first = true;

        while let Some(current_event) = events_to_process.pop() {
            let resolution = match &current_event {
                Event::ExchangeSucceeded { exchange, .. } => {
                    Some(SendOutcome::Confirmed(exchange.clone()))
                }
                Event::ExchangeFailed { message, .. } => Some(SendOutcome::Failed {
                    message: message.clone(),
                }),
                _ => None,
            };

            // Pure state transition
            let result = {
                let mut inner = self.inner.lock().unwrap();
                transition(&inner.state, current_event).map(|r| {
                    inner.state = r.new_state;
                    r.effects
                })
            };

            let effects = match result {
                Ok(effects) => effects,
                Err(TransitionError::StaleExchange(token)) if !first => {
                    tracing::info!(token = %token, "Discarding result for superseded exchange");
                    outcome = Some(SendOutcome::Discarded);
                    continue;
                }
                Err(e) if first => return Err(e),
                Err(e) => {
                    tracing::error!(error = %e, "Transition rejected follow-up event");
                    continue;
                }
            };
            first = false;

            if resolution.is_some() {
                outcome = resolution;
            }

            for effect in effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push(generated_event);
                }
            }
        }

        Ok(outcome)
    }

    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::RequestExchange {
                token,
                conversation_id,
                content,
            } => {
                tracing::info!(token = %token, conv_id = %conversation_id, "Sending message");
                match self.transport.exchange(conversation_id, &content).await {
                    Ok(exchange) => {
                        tracing::info!(
                            token = %token,
                            user_message_id = exchange.user_message.id,
                            assistant_message_id = exchange.assistant_message.id,
                            "Exchange confirmed"
                        );
                        Some(Event::ExchangeSucceeded { token, exchange })
                    }
                    Err(e) => {
                        tracing::warn!(token = %token, kind = ?e.kind, error = %e, "Exchange failed");
                        Some(Event::ExchangeFailed {
                            token,
                            message: e.message,
                            failed_at: Utc::now(),
                        })
                    }
                }
            }

            Effect::PublishTimeline => {
                let _ = self
                    .broadcast_tx
                    .send(SessionEvent::TimelineChanged(self.messages()));
                None
            }

            Effect::PublishConversation => {
                let _ = self
                    .broadcast_tx
                    .send(SessionEvent::ConversationChanged(self.conversation()));
                None
            }

            Effect::Notify(notification) => {
                self.notify(notification);
                None
            }
        }
    }

    /// Only the first of overlapping store calls flips the flag on
    fn begin_loading(&self) {
        let started = {
            let mut inner = self.inner.lock().unwrap();
            inner.loads_in_flight += 1;
            inner.loads_in_flight == 1
        };
        if started {
            let _ = self.broadcast_tx.send(SessionEvent::LoadingChanged(true));
        }
    }

    /// Only the last of overlapping store calls flips the flag off
    fn end_loading(&self) {
        let finished = {
            let mut inner = self.inner.lock().unwrap();
            inner.loads_in_flight = inner.loads_in_flight.saturating_sub(1);
            inner.loads_in_flight == 0
        };
        if finished {
            let _ = self.broadcast_tx.send(SessionEvent::LoadingChanged(false));
        }
    }

    fn notify(&self, notification: Notification) {
        let _ = self
            .broadcast_tx
            .send(SessionEvent::Notification(notification));
    }
}
