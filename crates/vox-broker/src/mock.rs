//! Mock broker with pre-programmed replies for deterministic tests.
//!
//! Scripts one [`MockReply`] per published request, records a broker-side
//! event log (subscribe/publish/reply/cancel), and tracks open reply
//! subscriptions so tests can assert none leak.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use vox_core::errors::BrokerError;

use crate::channel::{BrokerChannel, BrokerConnector, Reply, RequestProperties};

/// Scripted behavior for one published request.
#[derive(Debug)]
pub enum MockReply {
    /// Reply with this JSON body, echoing the request's correlation id.
    Respond(serde_json::Value),
    /// Reply with raw bytes (undecodable-body testing).
    RespondRaw(Vec<u8>),
    /// Reply with an explicit correlation id (mismatch testing).
    RespondWithCorrelation(String, serde_json::Value),
    /// Wait, then apply the inner behavior.
    Delay(Duration, Box<MockReply>),
    /// Never reply (timeout testing).
    Silent,
}

/// Broker-side observation, in occurrence order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    /// A reply subscription opened (consumer tag).
    Subscribe(String),
    /// A request published (correlation id).
    Publish(String),
    /// A reply delivered (consumer tag it went to).
    Reply(String),
    /// A reply subscription cancelled (consumer tag).
    Cancel(String),
    /// A channel closed.
    ChannelClosed,
}

#[derive(Default)]
struct MockState {
    replies: Mutex<VecDeque<MockReply>>,
    events: Mutex<Vec<MockEvent>>,
    subscriptions: Mutex<HashMap<String, mpsc::UnboundedSender<Reply>>>,
    publish_failures: Mutex<u32>,
}

impl MockState {
    fn record(&self, event: MockEvent) {
        self.events.lock().push(event);
    }

    fn deliver(&self, consumer_tag: &str, correlation_id: Option<String>, body: Vec<u8>) {
        let sender = self.subscriptions.lock().get(consumer_tag).cloned();
        if let Some(sender) = sender {
            if sender
                .send(Reply {
                    correlation_id,
                    body,
                })
                .is_ok()
            {
                self.record(MockEvent::Reply(consumer_tag.to_string()));
            }
        }
    }
}

/// Scriptable in-process broker. Cloning shares the script and event log;
/// also acts as the [`BrokerConnector`] handed to the server under test.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<MockState>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the behavior for the next published request. Requests beyond
    /// the script get [`MockReply::Silent`].
    pub fn push_reply(&self, reply: MockReply) {
        self.state.replies.lock().push_back(reply);
    }

    pub fn success_reply(audio_id: &str) -> MockReply {
        MockReply::Respond(serde_json::json!({"success": true, "audio_id": audio_id}))
    }

    pub fn busy_reply() -> MockReply {
        MockReply::Respond(serde_json::json!({"success": false, "reason": "busy"}))
    }

    pub fn rejected_reply(reason: &str) -> MockReply {
        MockReply::Respond(serde_json::json!({"success": false, "reason": reason}))
    }

    /// Make the next publish fail with a broker error.
    pub fn fail_next_publish(&self) {
        *self.state.publish_failures.lock() += 1;
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.events.lock().clone()
    }

    /// Currently open reply subscriptions (leak detection).
    pub fn open_subscription_count(&self) -> usize {
        self.state.subscriptions.lock().len()
    }

    /// Requests published so far.
    pub fn published_count(&self) -> usize {
        self.state
            .events
            .lock()
            .iter()
            .filter(|e| matches!(e, MockEvent::Publish(_)))
            .count()
    }
}

#[async_trait]
impl BrokerConnector for MockBroker {
    async fn open_channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        Ok(Box::new(MockChannel {
            state: Arc::clone(&self.state),
            current_tag: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MockChannel {
    state: Arc<MockState>,
    current_tag: Mutex<Option<String>>,
    closed: AtomicBool,
}

#[async_trait]
impl BrokerChannel for MockChannel {
    fn reply_to(&self) -> &str {
        "mock.reply-to"
    }

    async fn consume_replies(
        &self,
        consumer_tag: &str,
    ) -> Result<BoxStream<'static, Reply>, BrokerError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(BrokerError::Closed);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self
            .state
            .subscriptions
            .lock()
            .insert(consumer_tag.to_string(), tx);
        *self.current_tag.lock() = Some(consumer_tag.to_string());
        self.state.record(MockEvent::Subscribe(consumer_tag.to_string()));
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn cancel_replies(&self, consumer_tag: &str) -> Result<(), BrokerError> {
        let _ = self.state.subscriptions.lock().remove(consumer_tag);
        let mut current = self.current_tag.lock();
        if current.as_deref() == Some(consumer_tag) {
            *current = None;
        }
        self.state.record(MockEvent::Cancel(consumer_tag.to_string()));
        Ok(())
    }

    async fn publish(&self, props: &RequestProperties, _body: &[u8]) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(BrokerError::Closed);
        }
        {
            let mut failures = self.state.publish_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(BrokerError::Publish("scripted publish failure".into()));
            }
        }
        self.state
            .record(MockEvent::Publish(props.correlation_id.clone()));

        let behavior = self
            .state
            .replies
            .lock()
            .pop_front()
            .unwrap_or(MockReply::Silent);
        let tag = match self.current_tag.lock().clone() {
            Some(tag) => tag,
            None => return Ok(()),
        };
        apply_reply(
            Arc::clone(&self.state),
            tag,
            props.correlation_id.clone(),
            behavior,
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::Relaxed);
        if let Some(tag) = self.current_tag.lock().take() {
            let _ = self.state.subscriptions.lock().remove(&tag);
        }
        self.state.record(MockEvent::ChannelClosed);
        Ok(())
    }
}

/// Resolve a scripted behavior. Immediate replies deliver synchronously so
/// the event log preserves intra-call ordering; delays run on a spawned task.
fn apply_reply(state: Arc<MockState>, tag: String, correlation_id: String, behavior: MockReply) {
    match behavior {
        MockReply::Silent => {}
        MockReply::Respond(value) => {
            state.deliver(&tag, Some(correlation_id), value.to_string().into_bytes());
        }
        MockReply::RespondRaw(bytes) => {
            state.deliver(&tag, Some(correlation_id), bytes);
        }
        MockReply::RespondWithCorrelation(other_id, value) => {
            state.deliver(&tag, Some(other_id), value.to_string().into_bytes());
        }
        MockReply::Delay(delay, inner) => {
            drop(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                apply_reply(state, tag, correlation_id, *inner);
            }));
        }
    }
}
