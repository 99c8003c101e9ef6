//! Mock implementations for testing
//!
//! These mocks enable integration testing of chat sessions without real I/O.

use crate::db::{Conversation, ConversationId, ConversationWithMessages, Message, Role};
use crate::store::{ConversationStore, MemoryStorage, StoreError};
use crate::transport::{ChatTransport, Exchange, TransportError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ============================================================================
// Mock Transport
// ============================================================================

/// Transport that returns queued results
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<Exchange, TransportError>>>,
    /// Record of all calls made
    pub requests: Mutex<Vec<(ConversationId, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_exchange(&self, exchange: Exchange) {
        self.responses.lock().unwrap().push_back(Ok(exchange));
    }

    pub fn queue_error(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self) -> Result<Exchange, TransportError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::network("No mock response queued")))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((conversation_id, content.to_string()));
        self.next_response()
    }
}

// ============================================================================
// Gated Mock Transport (for in-flight testing)
// ============================================================================

/// Transport that holds each call until the test releases it
pub struct GatedMockTransport {
    inner: MockTransport,
    /// Notified when a call starts (for test synchronization)
    pub request_started: Arc<Notify>,
    /// Notify once per call to let it complete
    pub release: Arc<Notify>,
}

impl GatedMockTransport {
    pub fn new() -> Self {
        Self {
            inner: MockTransport::new(),
            request_started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        }
    }

    pub fn queue_exchange(&self, exchange: Exchange) {
        self.inner.queue_exchange(exchange);
    }

    pub fn request_count(&self) -> usize {
        self.inner.request_count()
    }
}

#[async_trait]
impl ChatTransport for GatedMockTransport {
    async fn exchange(
        &self,
        conversation_id: ConversationId,
        content: &str,
    ) -> Result<Exchange, TransportError> {
        self.inner
            .requests
            .lock()
            .unwrap()
            .push((conversation_id, content.to_string()));
        self.request_started.notify_one();
        self.release.notified().await;
        self.inner.next_response()
    }
}

// ============================================================================
// Gated Store (for overlapping loads)
// ============================================================================

/// Store whose `get_conversation` waits until the test releases it
pub struct GatedStore {
    inner: Arc<MemoryStorage>,
    /// Notify once per held lookup to let it complete
    pub release: Arc<Notify>,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStorage>) -> Self {
        Self {
            inner,
            release: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl ConversationStore for GatedStore {
    async fn get_conversation(
        &self,
        id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        self.release.notified().await;
        self.inner.get_conversation(id).await
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        self.inner.list_conversations().await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError> {
        self.inner.create_conversation(title).await
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<bool, StoreError> {
        self.inner.delete_conversation(id).await
    }
}

// ============================================================================
// Failing Store
// ============================================================================

/// Store whose every call fails
pub struct FailingStore;

#[async_trait]
impl ConversationStore for FailingStore {
    async fn get_conversation(
        &self,
        _id: ConversationId,
    ) -> Result<Option<ConversationWithMessages>, StoreError> {
        Err(StoreError::Http("connection refused".to_string()))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>, StoreError> {
        Err(StoreError::Http("connection refused".to_string()))
    }

    async fn create_conversation(&self, _title: &str) -> Result<Conversation, StoreError> {
        Err(StoreError::Http("connection refused".to_string()))
    }

    async fn delete_conversation(&self, _id: ConversationId) -> Result<bool, StoreError> {
        Err(StoreError::Http("connection refused".to_string()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn stored_message(
    id: i64,
    conversation_id: ConversationId,
    role: Role,
    content: &str,
    timestamp: DateTime<Utc>,
) -> Message {
    Message {
        id,
        conversation_id,
        role,
        content: content.to_string(),
        timestamp,
        metadata: None,
    }
}

/// Confirmed pair as the server would return it
pub fn exchange(
    conversation_id: ConversationId,
    first_id: i64,
    content: &str,
    reply: &str,
) -> Exchange {
    let t1 = Utc::now();
    let t2 = t1 + chrono::Duration::milliseconds(5);
    Exchange {
        user_message: stored_message(first_id, conversation_id, Role::User, content, t1),
        assistant_message: stored_message(first_id + 1, conversation_id, Role::Assistant, reply, t2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::EchoAssistant;
    use crate::runtime::{ChatSession, Identity, SendOutcome, SessionError, SessionEvent};
    use crate::state_machine::{
        EntryKey, ExchangeState, MessageStatus, EXCHANGE_ERROR_REPLY, SEND_FAILED_NOTICE,
    };
    use crate::store::MessageStore;
    use crate::transport::LocalTransport;
    use tokio::sync::broadcast;

    type MockSession = ChatSession<Arc<MemoryStorage>, Arc<MockTransport>>;

    fn session() -> (MockSession, Arc<MemoryStorage>, Arc<MockTransport>) {
        let store = Arc::new(MemoryStorage::new());
        let transport = Arc::new(MockTransport::new());
        let session = ChatSession::new(store.clone(), transport.clone(), None);
        (session, store, transport)
    }

    fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_mock_transport() {
        let mock = MockTransport::new();
        mock.queue_exchange(exchange(1, 1, "a", "b"));

        assert!(mock.exchange(1, "a").await.is_ok());
        // Second call should fail (no more responses)
        assert!(mock.exchange(1, "a").await.is_err());
        assert_eq!(mock.request_count(), 2);
    }

    #[tokio::test]
    async fn test_successful_exchange_replaces_provisional_pair() {
        let (session, _store, transport) = session();
        let id = session
            .start_new_conversation(Some("Trip planning"))
            .await
            .unwrap();
        assert_eq!(session.conversation().unwrap().title, "Trip planning");

        transport.queue_exchange(exchange(id, 101, "Hello", "Hi there!"));
        let outcome = session.send_user_message("Hello").await.unwrap();
        assert!(matches!(outcome, SendOutcome::Confirmed(_)));

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].key, EntryKey::Durable { id: 101 });
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[1].key, EntryKey::Durable { id: 102 });
        assert_eq!(messages[1].content, "Hi there!");
        assert!(messages.iter().all(|m| m.status == MessageStatus::Confirmed));
        assert!(!session.is_loading());
        assert!(matches!(
            session.exchange_state(),
            ExchangeState::Confirmed { .. }
        ));

        let requests = transport.requests.lock().unwrap().clone();
        assert_eq!(requests, vec![(id, "Hello".to_string())]);
    }

    #[tokio::test]
    async fn test_network_failure_keeps_user_message() {
        let (session, _store, transport) = session();
        session
            .start_new_conversation(Some("Trip planning"))
            .await
            .unwrap();
        let mut rx = session.subscribe();

        transport.queue_error(TransportError::network("Connection failed"));
        let outcome = session.send_user_message("Hello").await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                message: "Connection failed".to_string()
            }
        );

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello");
        assert_eq!(messages[0].status, MessageStatus::Unsent);
        assert!(messages[0].is_provisional());
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, EXCHANGE_ERROR_REPLY);
        assert_eq!(messages[1].status, MessageStatus::Error);

        let notified = drain(&mut rx).into_iter().any(|e| {
            matches!(e, SessionEvent::Notification(n) if n.description == SEND_FAILED_NOTICE)
        });
        assert!(notified);
    }

    #[tokio::test]
    async fn test_load_missing_conversation_leaves_state() {
        let (session, _store, transport) = session();
        let id = session.start_new_conversation(None).await.unwrap();
        transport.queue_exchange(exchange(id, 1, "Hello", "Hi"));
        session.send_user_message("Hello").await.unwrap();
        let before = session.messages();
        let mut rx = session.subscribe();

        let err = session.load_conversation(7).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(7)));
        assert_eq!(session.messages(), before);
        assert_eq!(session.conversation().unwrap().id, id);
        assert!(!session.is_loading());

        let events = drain(&mut rx);
        let loading: Vec<bool> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::LoadingChanged(l) => Some(*l),
                _ => None,
            })
            .collect();
        assert_eq!(loading, [true, false]);
        let toasts: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::Notification(n) => Some(n.description.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(toasts, ["Failed to load conversation"]);
    }

    #[tokio::test]
    async fn test_reload_during_send_keeps_exchange_in_flight() {
        let store = Arc::new(MemoryStorage::new());
        let transport = Arc::new(GatedMockTransport::new());
        let session = Arc::new(ChatSession::new(store, transport.clone(), None));
        let id = session.start_new_conversation(None).await.unwrap();
        transport.queue_exchange(exchange(id, 1, "first", "r1"));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send_user_message("first").await }
        });
        transport.request_started.notified().await;

        session.load_conversation(id).await.unwrap();
        assert!(session.exchange_state().is_in_flight());
        let statuses: Vec<_> = session.messages().iter().map(|m| m.status).collect();
        assert_eq!(statuses, [MessageStatus::Sending, MessageStatus::Pending]);

        let err = session.send_user_message("second").await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert_eq!(transport.request_count(), 1);

        transport.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, SendOutcome::Confirmed(_)));

        let messages = session.messages();
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "r1"]);
        assert!(messages.iter().all(|m| m.status == MessageStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_overlapping_loads_keep_loading_flag() {
        let memory = Arc::new(MemoryStorage::new());
        let stored_id = memory.create_conversation("stored").await.unwrap().id;
        let store = Arc::new(GatedStore::new(memory));
        let transport = Arc::new(MockTransport::new());
        let session = Arc::new(ChatSession::new(store.clone(), transport, None));
        let mut rx = session.subscribe();

        let load = tokio::spawn({
            let session = session.clone();
            async move { session.load_conversation(stored_id).await }
        });
        while !session.is_loading() {
            tokio::task::yield_now().await;
        }

        session.start_new_conversation(Some("scratch")).await.unwrap();
        assert!(session.is_loading());

        store.release.notify_one();
        load.await.unwrap().unwrap();
        assert!(!session.is_loading());
        assert_eq!(session.conversation().unwrap().id, stored_id);

        let loading: Vec<bool> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::LoadingChanged(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(loading, [true, false]);
    }

    #[tokio::test]
    async fn test_second_send_while_in_flight_is_busy() {
        let store = Arc::new(MemoryStorage::new());
        let transport = Arc::new(GatedMockTransport::new());
        let session = Arc::new(ChatSession::new(store, transport.clone(), None));
        let id = session.start_new_conversation(None).await.unwrap();
        transport.queue_exchange(exchange(id, 11, "first", "reply"));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.send_user_message("first").await }
        });
        transport.request_started.notified().await;

        let err = session.send_user_message("second").await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert_eq!(transport.request_count(), 1);
        let statuses: Vec<_> = session.messages().iter().map(|m| m.status).collect();
        assert_eq!(statuses, [MessageStatus::Sending, MessageStatus::Pending]);

        transport.release.notify_one();
        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, SendOutcome::Confirmed(_)));

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert!(messages.iter().all(|m| m.status == MessageStatus::Confirmed));
    }

    #[tokio::test]
    async fn test_blank_send_is_skipped() {
        let (session, _store, transport) = session();

        // No conversation yet
        assert_eq!(
            session.send_user_message("Hello").await.unwrap(),
            SendOutcome::Skipped
        );

        session.start_new_conversation(None).await.unwrap();
        for blank in ["", "   ", "\n\t "] {
            assert_eq!(
                session.send_user_message(blank).await.unwrap(),
                SendOutcome::Skipped
            );
        }
        assert!(session.messages().is_empty());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_result_after_switch_is_discarded() {
        let store = Arc::new(MemoryStorage::new());
        let transport = Arc::new(GatedMockTransport::new());
        let session = Arc::new(ChatSession::new(store, transport.clone(), None));
        let first_id = session.start_new_conversation(Some("first")).await.unwrap();
        transport.queue_exchange(exchange(first_id, 1, "Hello", "Hi"));

        let pending = tokio::spawn({
            let session = session.clone();
            async move { session.send_user_message("Hello").await }
        });
        transport.request_started.notified().await;

        let second_id = session.start_new_conversation(Some("second")).await.unwrap();
        transport.release.notify_one();

        assert_eq!(pending.await.unwrap().unwrap(), SendOutcome::Discarded);
        assert_eq!(session.conversation().unwrap().id, second_id);
        assert!(session.messages().is_empty());
        assert_eq!(session.exchange_state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_load_replaces_state_wholesale() {
        let (session, store, _transport) = session();
        let conv = store.create_conversation("stored").await.unwrap();
        store
            .create_message(conv.id, Role::User, "Hello", None)
            .await
            .unwrap();
        store
            .create_message(conv.id, Role::Assistant, "Hi there!", None)
            .await
            .unwrap();

        session.start_new_conversation(Some("scratch")).await.unwrap();
        session.load_conversation(conv.id).await.unwrap();

        assert_eq!(session.conversation().unwrap().title, "stored");
        let contents: Vec<_> = session
            .messages()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["Hello", "Hi there!"]);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_store_failures_leave_state() {
        let transport = Arc::new(MockTransport::new());
        let session = ChatSession::new(FailingStore, transport, Some(Identity::Guest));
        let mut rx = session.subscribe();

        let err = session.load_conversation(1).await.unwrap_err();
        assert!(matches!(err, SessionError::LoadFailed(_)));
        let err = session.start_new_conversation(None).await.unwrap_err();
        assert!(matches!(err, SessionError::CreateFailed(_)));

        assert!(session.conversation().is_none());
        assert!(session.messages().is_empty());
        assert!(!session.is_loading());
        assert!(session.identity().is_some_and(Identity::is_guest));

        let toasts: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Notification(n) => Some(n.description),
                _ => None,
            })
            .collect();
        assert_eq!(
            toasts,
            [
                "Failed to load conversation",
                "Failed to create a new conversation"
            ]
        );
    }

    #[tokio::test]
    async fn test_tokens_survive_conversation_switch() {
        let (session, _store, transport) = session();
        let a = session.start_new_conversation(Some("a")).await.unwrap();
        transport.queue_exchange(exchange(a, 1, "one", "r1"));
        session.send_user_message("one").await.unwrap();

        let b = session.start_new_conversation(Some("b")).await.unwrap();
        transport.queue_exchange(exchange(b, 3, "two", "r2"));
        session.send_user_message("two").await.unwrap();

        match session.exchange_state() {
            ExchangeState::Confirmed { token } => {
                assert_eq!(token.conversation_id, b);
                assert_eq!(token.seq, 1);
            }
            other => panic!("unexpected exchange state: {other:?}"),
        }
    }

    async fn send_many<T: ChatTransport>(session: &ChatSession<Arc<MemoryStorage>, T>, prefix: &str) {
        for i in 0..5 {
            let outcome = session
                .send_user_message(&format!("{prefix}-{i}"))
                .await
                .unwrap();
            assert!(matches!(outcome, SendOutcome::Confirmed(_)));
        }
    }

    #[tokio::test]
    async fn test_concurrent_sessions_do_not_interleave() {
        let store = Arc::new(MemoryStorage::new());
        let transport = Arc::new(LocalTransport::new(store.clone(), EchoAssistant));
        let left = ChatSession::new(store.clone(), transport.clone(), None);
        let right = ChatSession::new(store.clone(), transport.clone(), None);

        let left_id = left.start_new_conversation(Some("left")).await.unwrap();
        let right_id = right.start_new_conversation(Some("right")).await.unwrap();

        tokio::join!(send_many(&left, "left"), send_many(&right, "right"));

        for (session, id, prefix) in [(&left, left_id, "left"), (&right, right_id, "right")] {
            let messages = session.messages();
            assert_eq!(messages.len(), 10);
            assert!(messages.iter().all(|m| m.content.contains(prefix)));

            let stored = store.list_messages(id).await.unwrap();
            assert!(stored.iter().all(|m| m.conversation_id == id));
            assert!(stored.iter().all(|m| m.content.contains(prefix)));
        }
    }
}
