//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::db::{Conversation, Message, Role};
use crate::transport::Exchange;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

const CONV_ID: i64 = 7;

fn at(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap()
}

fn opened(prior: &[Message]) -> ChatState {
    transition(
        &ChatState::new(),
        Event::ConversationOpened {
            conversation: Conversation {
                id: CONV_ID,
                title: "New Conversation".to_string(),
                created_at: at(0),
                updated_at: at(0),
            },
            messages: prior.to_vec(),
        },
    )
    .unwrap()
    .new_state
}

fn stored(id: i64, role: Role, content: &str, millis: i64) -> Message {
    Message {
        id,
        conversation_id: CONV_ID,
        role,
        content: content.to_string(),
        timestamp: at(millis),
        metadata: None,
    }
}

fn request_token(result: &TransitionResult) -> Option<ExchangeToken> {
    result.effects.iter().find_map(|e| match e {
        Effect::RequestExchange { token, .. } => Some(*token),
        _ => None,
    })
}

fn is_sorted(timeline: &Timeline) -> bool {
    timeline
        .entries()
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp)
}

/// Simulated server: hands out ids and timestamps that only move forward
struct Server {
    next_id: i64,
    clock: i64,
}

impl Server {
    fn new(next_id: i64, clock: i64) -> Self {
        Self { next_id, clock }
    }

    fn exchange(&mut self, content: &str, skew: i64) -> Exchange {
        self.clock += skew;
        let user = stored(self.next_id, Role::User, content, self.clock);
        self.clock += 1;
        let assistant = stored(self.next_id + 1, Role::Assistant, "reply", self.clock);
        self.next_id += 2;
        Exchange {
            user_message: user,
            assistant_message: assistant,
        }
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_text() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ?!]{0,8}[a-zA-Z0-9?!][a-zA-Z0-9 ?!]{0,8}"
}

fn arb_blank() -> impl Strategy<Value = String> {
    prop::collection::vec(prop_oneof![Just(' '), Just('\t'), Just('\n')], 0..6)
        .prop_map(|chars| chars.into_iter().collect())
}

#[derive(Debug, Clone)]
enum Step {
    Send { text: String, local_skew: i64 },
    Succeed { server_skew: i64 },
    Fail,
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (arb_text(), -50i64..50).prop_map(|(text, local_skew)| Step::Send { text, local_skew }),
        (0i64..50).prop_map(|server_skew| Step::Succeed { server_skew }),
        Just(Step::Fail),
    ]
}

fn arb_prior() -> impl Strategy<Value = Vec<Message>> {
    (0usize..4).prop_map(|pairs| {
        let mut server = Server::new(1, 0);
        (0..pairs)
            .flat_map(|i| {
                let e = server.exchange(&format!("prior {i}"), 10);
                [e.user_message, e.assistant_message]
            })
            .collect()
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Successful sends append alternating user/assistant pairs after the
    /// prior tail, in non-decreasing time order
    #[test]
    fn prop_successful_sends_stay_ordered(
        prior in arb_prior(),
        sends in prop::collection::vec((arb_text(), 0i64..20), 1..8),
    ) {
        let mut state = opened(&prior);
        let mut server = Server::new(1000, 10_000);

        for (i, (text, skew)) in sends.iter().enumerate() {
            let sent = transition(&state, Event::UserMessage {
                text: text.clone(),
                sent_at: at(5_000 + i64::try_from(i).unwrap()),
            }).unwrap();
            let token = request_token(&sent).unwrap();
            let exchange = server.exchange(text, *skew);
            state = transition(&sent.new_state, Event::ExchangeSucceeded { token, exchange })
                .unwrap()
                .new_state;
        }

        let entries = state.timeline.entries();
        prop_assert!(is_sorted(&state.timeline));
        prop_assert_eq!(entries.len(), prior.len() + 2 * sends.len());
        prop_assert!(entries.iter().all(|e| e.status == MessageStatus::Confirmed));

        for (entry, prior) in entries.iter().zip(&prior) {
            prop_assert_eq!(entry.key, EntryKey::Durable { id: prior.id });
        }
        for (pair, (text, _)) in entries[prior.len()..].chunks(2).zip(&sends) {
            prop_assert_eq!(pair[0].role, Role::User);
            prop_assert_eq!(&pair[0].content, text);
            prop_assert_eq!(pair[1].role, Role::Assistant);
        }
    }

    /// A success removes exactly the two entries tagged with its token and
    /// adds exactly the two confirmed entries; nothing else moves
    #[test]
    fn prop_success_replaces_exactly_its_pair(
        steps in prop::collection::vec(arb_step(), 0..12),
        text in arb_text(),
    ) {
        let mut state = opened(&[]);
        let mut server = Server::new(1, 0);
        let mut clock = 100;

        for step in steps {
            clock += 10;
            let event = match (step, state.exchange.in_flight()) {
                (Step::Send { text, local_skew }, None) => Event::UserMessage {
                    text,
                    sent_at: at(clock + local_skew),
                },
                (Step::Succeed { server_skew }, Some(token)) => Event::ExchangeSucceeded {
                    token,
                    exchange: server.exchange("x", server_skew),
                },
                (Step::Fail, Some(token)) => Event::ExchangeFailed {
                    token,
                    message: "network".to_string(),
                    failed_at: at(clock),
                },
                _ => continue,
            };
            state = transition(&state, event).unwrap().new_state;
        }

        let before: Vec<MessageView> = state.timeline.entries().to_vec();
        let Ok(sent) = transition(&state, Event::UserMessage { text: text.clone(), sent_at: at(clock) }) else {
            // Only possible when the last step left an exchange in flight
            prop_assert!(state.exchange.is_in_flight());
            return Ok(());
        };
        let token = request_token(&sent).unwrap();
        let exchange = server.exchange(&text, 5);
        let new_ids = [exchange.user_message.id, exchange.assistant_message.id];
        let after = transition(&sent.new_state, Event::ExchangeSucceeded { token, exchange })
            .unwrap()
            .new_state;

        let untouched: Vec<&MessageView> = after
            .timeline
            .entries()
            .iter()
            .filter(|e| !matches!(e.key, EntryKey::Durable { id } if new_ids.contains(&id)))
            .collect();
        prop_assert_eq!(untouched, before.iter().collect::<Vec<_>>());
        prop_assert!(after.timeline.entries().iter().all(|e| e.key.token() != Some(token)));
        prop_assert_eq!(after.timeline.len(), before.len() + 2);
    }

    /// A failure keeps the typed content exactly once, drops the placeholder
    /// and appends exactly one error entry
    #[test]
    fn prop_failure_preserves_user_input(
        prior in arb_prior(),
        text in arb_text(),
        failed_after in 0i64..1_000,
    ) {
        let state = opened(&prior);
        let sent = transition(&state, Event::UserMessage {
            text: text.clone(),
            sent_at: at(50_000),
        }).unwrap();
        let token = request_token(&sent).unwrap();

        let failed = transition(&sent.new_state, Event::ExchangeFailed {
            token,
            message: "boom".to_string(),
            failed_at: at(50_000 + failed_after),
        }).unwrap().new_state;

        let tagged: Vec<&MessageView> = failed
            .timeline
            .entries()
            .iter()
            .filter(|e| e.key.token() == Some(token))
            .collect();
        prop_assert_eq!(tagged.len(), 2);
        prop_assert_eq!(tagged.iter().filter(|e| e.role == Role::User && e.content == text).count(), 1);
        prop_assert!(tagged.iter().all(|e| e.status != MessageStatus::Pending));
        prop_assert_eq!(tagged.iter().filter(|e| e.status == MessageStatus::Error).count(), 1);
        prop_assert_eq!(failed.timeline.len(), prior.len() + 2);
        prop_assert!(is_sorted(&failed.timeline));
    }

    /// Blank content never produces a transport request
    #[test]
    fn prop_blank_send_is_inert(prior in arb_prior(), blank in arb_blank()) {
        let state = opened(&prior);
        let result = transition(&state, Event::UserMessage { text: blank, sent_at: at(1) });
        prop_assert_eq!(result.unwrap_err(), TransitionError::EmptyMessage);
    }

    /// Whatever happens, the timeline stays sorted and holds at most one
    /// in-flight pair
    #[test]
    fn prop_timeline_always_sorted(steps in prop::collection::vec(arb_step(), 0..30)) {
        let mut state = opened(&[]);
        let mut server = Server::new(1, 0);
        let mut clock = 0;

        for step in steps {
            clock += 7;
            let event = match (step, state.exchange.in_flight()) {
                (Step::Send { text, local_skew }, _) => Event::UserMessage {
                    text,
                    sent_at: at(clock + local_skew),
                },
                (Step::Succeed { server_skew }, Some(token)) => Event::ExchangeSucceeded {
                    token,
                    exchange: server.exchange("x", server_skew),
                },
                (Step::Fail, Some(token)) => Event::ExchangeFailed {
                    token,
                    message: "network".to_string(),
                    failed_at: at(clock),
                },
                _ => continue,
            };
            match transition(&state, event) {
                Ok(result) => state = result.new_state,
                Err(e) => prop_assert_eq!(e, TransitionError::Busy),
            }

            prop_assert!(is_sorted(&state.timeline));
            let in_flight = state
                .timeline
                .entries()
                .iter()
                .filter(|e| e.status == MessageStatus::Pending)
                .count();
            prop_assert!(in_flight <= 1);
            prop_assert_eq!(in_flight == 1, state.exchange.is_in_flight());
        }
    }
}
