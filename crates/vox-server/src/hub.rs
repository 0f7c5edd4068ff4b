//! The connection hub: one control-loop task owns the channel → session
//! registry and serializes every mutation and broadcast.
//!
//! No component touches the registry directly: register, unregister,
//! lookup, and broadcast all travel through the loop's command channel, so
//! at most one of them is in flight at any moment and the map needs no lock.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use vox_core::announce::Announcement;
use vox_core::errors::SessionFault;
use vox_core::ids::ChannelId;

use crate::metrics::{
    HUB_DROPPED_ANNOUNCEMENTS_TOTAL, HUB_EVICTIONS_TOTAL, SESSIONS_ACTIVE,
};
use crate::session::Session;

/// Command channel depth. Senders briefly queue behind a busy loop; none of
/// the operations block inside the loop, so this never grows far.
const COMMAND_BUFFER: usize = 64;

enum HubCommand {
    Register(Arc<Session>),
    Unregister(Arc<Session>),
    Lookup(ChannelId, oneshot::Sender<Option<Arc<Session>>>),
    Broadcast(Announcement),
}

/// Spawns the control loop.
pub struct Hub;

impl Hub {
    pub fn spawn() -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(run(rx));
        (HubHandle { tx }, task)
    }
}

/// Cloneable handle to the hub's control loop.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Insert or replace the entry for the session's channel. A replaced
    /// predecessor is torn down rather than left to linger.
    pub async fn register(&self, session: Arc<Session>) {
        let _ = self.tx.send(HubCommand::Register(session)).await;
    }

    /// Remove the session if its channel still maps to this exact session;
    /// a session already gone or already replaced is a no-op.
    pub async fn unregister(&self, session: Arc<Session>) {
        let _ = self.tx.send(HubCommand::Unregister(session)).await;
    }

    /// Read-only query, answered by the control loop.
    pub async fn lookup(&self, channel_id: &ChannelId) -> Option<Arc<Session>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .tx
            .send(HubCommand::Lookup(channel_id.clone(), reply_tx))
            .await
            .is_err()
        {
            return None;
        }
        reply_rx.await.unwrap_or(None)
    }

    /// Deliver an announcement to its target session's outbound queue.
    /// A saturated queue evicts the session; no live session drops the
    /// announcement silently.
    pub async fn broadcast(&self, announcement: Announcement) {
        let _ = self.tx.send(HubCommand::Broadcast(announcement)).await;
    }
}

async fn run(mut rx: mpsc::Receiver<HubCommand>) {
    let mut registry: HashMap<ChannelId, Arc<Session>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register(session) => {
                let channel_id = session.channel_id().clone();
                if let Some(previous) = registry.insert(channel_id.clone(), session) {
                    info!(
                        channel = %channel_id,
                        conn = %previous.connection_id(),
                        "session replaced by a new connection"
                    );
                    previous.begin_teardown();
                }
            }
            HubCommand::Unregister(session) => {
                let still_current = registry
                    .get(session.channel_id())
                    .is_some_and(|current| Arc::ptr_eq(current, &session));
                if still_current {
                    let _ = registry.remove(session.channel_id());
                    session.begin_teardown();
                    debug!(channel = %session.channel_id(), "session unregistered");
                }
            }
            HubCommand::Lookup(channel_id, reply) => {
                let _ = reply.send(registry.get(&channel_id).cloned());
            }
            HubCommand::Broadcast(announcement) => {
                let channel_id = announcement.channel_id.clone();
                let Some(session) = registry.get(&channel_id) else {
                    debug!(channel = %channel_id, "announcement dropped, no live session");
                    counter!(HUB_DROPPED_ANNOUNCEMENTS_TOTAL).increment(1);
                    continue;
                };
                if let Err(fault) = session.try_enqueue(announcement) {
                    warn!(
                        channel = %channel_id,
                        conn = %session.connection_id(),
                        fault = fault.fault_kind(),
                        "evicting session"
                    );
                    counter!(HUB_EVICTIONS_TOTAL, "reason" => fault.fault_kind()).increment(1);
                    if let Some(evicted) = registry.remove(&channel_id) {
                        evicted.begin_teardown();
                    }
                }
            }
        }
        gauge!(SESSIONS_ACTIVE).set(registry.len() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::Receiver;
    use vox_broker::mock::MockBroker;
    use vox_broker::{BrokerConnector, GatewayConfig, SynthesisGateway};

    async fn test_session(channel: &str, capacity: usize) -> (Arc<Session>, Receiver<Announcement>) {
        let broker = MockBroker::new();
        let broker_channel = broker.open_channel().await.unwrap();
        let gateway = SynthesisGateway::new(
            broker_channel,
            GatewayConfig {
                routing_key: "tts.synthesize".into(),
                request_expiration_ms: 60_000,
                call_timeout: Duration::from_millis(100),
                playback_base_url: "http://localhost:7001".into(),
            },
        );
        Session::new(ChannelId::from_raw(channel), gateway, capacity)
    }

    fn announcement(channel: &str, text: &str) -> Announcement {
        Announcement::bare(ChannelId::from_raw(channel), "http://x/play/a", text)
    }

    #[tokio::test]
    async fn register_then_lookup() {
        let (hub, _task) = Hub::spawn();
        let (session, _rx) = test_session("chan1", 8).await;

        hub.register(Arc::clone(&session)).await;
        let found = hub.lookup(&ChannelId::from_raw("chan1")).await.unwrap();
        assert!(Arc::ptr_eq(&found, &session));
    }

    #[tokio::test]
    async fn lookup_unknown_channel_is_none() {
        let (hub, _task) = Hub::spawn();
        assert!(hub.lookup(&ChannelId::from_raw("ghost")).await.is_none());
    }

    #[tokio::test]
    async fn second_register_replaces_and_tears_down_predecessor() {
        let (hub, _task) = Hub::spawn();
        let (first, _rx1) = test_session("chan1", 8).await;
        let (second, _rx2) = test_session("chan1", 8).await;

        hub.register(Arc::clone(&first)).await;
        hub.register(Arc::clone(&second)).await;

        let found = hub.lookup(&ChannelId::from_raw("chan1")).await.unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert!(first.is_closing(), "superseded session must be torn down");
        assert!(!second.is_closing());
    }

    #[tokio::test]
    async fn unregister_removes_entry() {
        let (hub, _task) = Hub::spawn();
        let (session, _rx) = test_session("chan1", 8).await;

        hub.register(Arc::clone(&session)).await;
        hub.unregister(Arc::clone(&session)).await;
        assert!(hub.lookup(&ChannelId::from_raw("chan1")).await.is_none());
        assert!(session.is_closing());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let (hub, _task) = Hub::spawn();
        let (session, _rx) = test_session("chan1", 8).await;

        hub.register(Arc::clone(&session)).await;
        hub.unregister(Arc::clone(&session)).await;
        hub.unregister(Arc::clone(&session)).await;
        assert!(hub.lookup(&ChannelId::from_raw("chan1")).await.is_none());
    }

    #[tokio::test]
    async fn unregister_of_replaced_session_keeps_successor() {
        let (hub, _task) = Hub::spawn();
        let (first, _rx1) = test_session("chan1", 8).await;
        let (second, _rx2) = test_session("chan1", 8).await;

        hub.register(Arc::clone(&first)).await;
        hub.register(Arc::clone(&second)).await;
        // The old connection's transport loop exits late and unregisters.
        hub.unregister(Arc::clone(&first)).await;

        let found = hub.lookup(&ChannelId::from_raw("chan1")).await.unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[tokio::test]
    async fn broadcast_delivers_fifo() {
        let (hub, _task) = Hub::spawn();
        let (session, mut rx) = test_session("chan1", 8).await;
        hub.register(session).await;

        hub.broadcast(announcement("chan1", "m1")).await;
        hub.broadcast(announcement("chan1", "m2")).await;
        hub.broadcast(announcement("chan1", "m3")).await;

        assert_eq!(rx.recv().await.unwrap().text, "m1");
        assert_eq!(rx.recv().await.unwrap().text, "m2");
        assert_eq!(rx.recv().await.unwrap().text, "m3");
    }

    #[tokio::test]
    async fn broadcast_without_session_is_dropped() {
        let (hub, _task) = Hub::spawn();
        hub.broadcast(announcement("nobody", "m1")).await;
        // Serialized behind the broadcast; proves the loop survived it.
        assert!(hub.lookup(&ChannelId::from_raw("nobody")).await.is_none());
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted() {
        let (hub, _task) = Hub::spawn();
        let (session, _rx) = test_session("chan1", 1).await;
        hub.register(Arc::clone(&session)).await;

        // Queue capacity 1 and nobody draining: second broadcast overflows.
        hub.broadcast(announcement("chan1", "m1")).await;
        hub.broadcast(announcement("chan1", "m2")).await;

        assert!(hub.lookup(&ChannelId::from_raw("chan1")).await.is_none());
        assert!(session.is_closing());
    }

    #[tokio::test]
    async fn eviction_only_affects_target_session() {
        let (hub, _task) = Hub::spawn();
        let (slow, _slow_rx) = test_session("slow", 1).await;
        let (fast, mut fast_rx) = test_session("fast", 8).await;
        hub.register(slow).await;
        hub.register(fast).await;

        hub.broadcast(announcement("slow", "m1")).await;
        hub.broadcast(announcement("slow", "m2")).await;
        hub.broadcast(announcement("fast", "m1")).await;

        assert!(hub.lookup(&ChannelId::from_raw("slow")).await.is_none());
        assert!(hub.lookup(&ChannelId::from_raw("fast")).await.is_some());
        assert_eq!(fast_rx.recv().await.unwrap().text, "m1");
    }
}
