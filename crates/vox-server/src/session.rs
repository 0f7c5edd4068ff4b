//! One live session: a channel's duplex connection paired with its broker
//! binding.
//!
//! The session owns the write side of the outbound queue (the hub's
//! broadcast path is its single producer) and the broker binding behind a
//! lock, so at most one synthesis call is in flight per session at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use vox_broker::SynthesisGateway;
use vox_core::announce::Announcement;
use vox_core::errors::{SessionFault, SynthesisError};
use vox_core::ids::{ChannelId, ConnectionId};

pub struct Session {
    channel_id: ChannelId,
    connection_id: ConnectionId,
    outbound: mpsc::Sender<Announcement>,
    /// Exclusive broker binding. The lock scopes the whole request/reply
    /// cycle: overlapping triggers for the same channel serialize here.
    gateway: Mutex<SynthesisGateway>,
    shutdown: CancellationToken,
    teardown_started: AtomicBool,
}

impl Session {
    /// Create a session and hand back the read side of its outbound queue.
    /// The caller (the transport layer) drives the queue receiver; the hub
    /// broadcasts into the sender.
    pub fn new(
        channel_id: ChannelId,
        gateway: SynthesisGateway,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Announcement>) {
        let (outbound, rx) = mpsc::channel(queue_capacity);
        let session = Arc::new(Self {
            channel_id,
            connection_id: ConnectionId::new(),
            outbound,
            gateway: Mutex::new(gateway),
            shutdown: CancellationToken::new(),
            teardown_started: AtomicBool::new(false),
        });
        (session, rx)
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Token the transport pumps watch; cancelled on teardown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Non-blocking enqueue from the hub's broadcast path. A full queue is
    /// the slow-consumer signal; the hub evicts on it rather than blocking.
    pub fn try_enqueue(&self, announcement: Announcement) -> Result<(), SessionFault> {
        self.outbound
            .try_send(announcement)
            .map_err(|_| SessionFault::SlowConsumer)
    }

    /// Run one synthesis call. Holds the session's gateway lock for the
    /// whole cycle, so concurrent triggers for this channel serialize in
    /// lock-acquisition order.
    pub async fn synthesize(&self, text: &str) -> Result<String, SynthesisError> {
        let gateway = self.gateway.lock().await;
        gateway.synthesize(text).await
    }

    /// Begin teardown. Idempotent; safe to call from the hub and the
    /// transport layer independently.
    ///
    /// Cancels the pumps immediately. The broker binding closes on a spawned
    /// task that first takes the gateway lock, so an in-flight synthesis
    /// call always resolves or times out before its channel goes away.
    pub fn begin_teardown(self: &Arc<Self>) {
        if self.teardown_started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        let session = Arc::clone(self);
        drop(tokio::spawn(async move {
            let gateway = session.gateway.lock().await;
            if let Err(err) = gateway.close().await {
                debug!(
                    channel = %session.channel_id,
                    conn = %session.connection_id,
                    error = %err,
                    "broker binding close failed"
                );
            }
            info!(
                channel = %session.channel_id,
                conn = %session.connection_id,
                "session torn down"
            );
        }));
    }

    pub fn is_closing(&self) -> bool {
        self.teardown_started.load(Ordering::SeqCst)
    }
}
