//! WebSocket transport: upgrade, liveness-only read loop, outbound write
//! pump.
//!
//! The write pump is the sole writer to a connection; the read side exists
//! to detect disconnects and answer liveness. The protocol defines no
//! inbound application traffic at all, so any text/binary frame from the
//! peer is a per-connection fault.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use vox_broker::SynthesisGateway;
use vox_core::announce::Announcement;
use vox_core::errors::SessionFault;
use vox_core::ids::ChannelId;
use vox_settings::SessionSettings;

use crate::metrics::{
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_PROTOCOL_VIOLATIONS_TOTAL,
};
use crate::server::AppState;
use crate::session::Session;

/// Transport timing knobs, derived from settings once per connection.
#[derive(Clone, Copy, Debug)]
pub struct Timings {
    /// Liveness probe period; below the idle timeout.
    pub ping_interval: Duration,
    /// Read-side deadline for the next inbound frame (pongs included).
    pub idle_timeout: Duration,
    /// Per-frame write deadline.
    pub write_timeout: Duration,
}

impl Timings {
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self {
            ping_interval: Duration::from_secs(settings.ping_interval_secs),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
            write_timeout: Duration::from_secs(settings.write_timeout_secs),
        }
    }
}

/// `GET /ws/{channel}` — accept one overlay connection for a channel.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let channel_id = ChannelId::from_raw(channel);
    ws.max_message_size(state.session_settings.max_frame_bytes)
        .on_upgrade(move |socket| handle_socket(socket, channel_id, state))
}

/// Drive one accepted connection to completion.
async fn handle_socket(socket: WebSocket, channel_id: ChannelId, state: AppState) {
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    // The broker binding must exist before the session does; a channel that
    // cannot reach the broker gets no registry entry.
    let broker_channel = match state.connector.open_channel().await {
        Ok(channel) => channel,
        Err(err) => {
            warn!(channel = %channel_id, error = %err, "broker binding failed, dropping connection");
            return;
        }
    };
    let gateway = SynthesisGateway::new(broker_channel, state.gateway_config.clone());
    let (session, outbound_rx) = Session::new(
        channel_id.clone(),
        gateway,
        state.session_settings.queue_capacity,
    );

    state.hub.register(Arc::clone(&session)).await;
    info!(channel = %channel_id, conn = %session.connection_id(), "overlay connected");

    let timings = Timings::from_settings(&state.session_settings);
    let (ws_tx, ws_rx) = socket.split();

    let writer = tokio::spawn(write_pump(ws_tx, outbound_rx, Arc::clone(&session), timings));
    let reader = tokio::spawn(read_pump(ws_rx, Arc::clone(&session), timings));

    // Either side ending (disconnect, fault, eviction) ends the connection.
    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    state.hub.unregister(Arc::clone(&session)).await;
    session.begin_teardown();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(channel = %channel_id, conn = %session.connection_id(), "overlay disconnected");
}

/// Sole writer to the connection: drains the outbound queue in FIFO order
/// and emits liveness probes. Ends on eviction, write failure, or a missed
/// write deadline; ending the pump closes the transport.
async fn write_pump(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Announcement>,
    session: Arc<Session>,
    timings: Timings,
) {
    let shutdown = session.shutdown_token();
    let mut ping = tokio::time::interval(timings.ping_interval);
    ping.tick().await; // consume first immediate tick

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                // Evicted or replaced: tell the peer before going away.
                let _ = tokio::time::timeout(
                    timings.write_timeout,
                    ws_tx.send(Message::Close(None)),
                )
                .await;
                break;
            }
            message = outbound.recv() => {
                let Some(announcement) = message else { break };
                let json = match serde_json::to_string(&announcement) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(conn = %session.connection_id(), error = %err, "announcement serialization failed");
                        continue;
                    }
                };
                match tokio::time::timeout(
                    timings.write_timeout,
                    ws_tx.send(Message::Text(json.into())),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    _ => break, // write failure or missed deadline
                }
            }
            _ = ping.tick() => {
                match tokio::time::timeout(
                    timings.write_timeout,
                    ws_tx.send(Message::Ping(Vec::new().into())),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    _ => break,
                }
            }
        }
    }
}

/// Liveness-only reader. Pongs (and the control traffic the transport
/// answers for us) reset the idle deadline; any application payload is a
/// protocol violation fatal to this connection alone.
async fn read_pump(mut ws_rx: SplitStream<WebSocket>, session: Arc<Session>, timings: Timings) {
    let shutdown = session.shutdown_token();

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = tokio::time::timeout(timings.idle_timeout, ws_rx.next()) => frame,
        };
        match frame {
            Err(_) => {
                debug!(conn = %session.connection_id(), "idle timeout, closing");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                debug!(conn = %session.connection_id(), error = %err, "read error");
                break;
            }
            Ok(Some(Ok(message))) => match message {
                Message::Pong(_) | Message::Ping(_) => {}
                Message::Close(_) => break,
                Message::Text(_) | Message::Binary(_) => {
                    counter!(WS_PROTOCOL_VIOLATIONS_TOTAL).increment(1);
                    error!(
                        channel = %session.channel_id(),
                        conn = %session.connection_id(),
                        fault = SessionFault::ProtocolViolation.fault_kind(),
                        "unexpected inbound payload, closing connection"
                    );
                    break;
                }
            },
        }
    }
}
