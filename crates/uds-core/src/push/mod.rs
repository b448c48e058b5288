//! Push channel client.
//!
//! A background task owns the connection state machine
//! (`Disconnected → Connecting → Connected`), publishes every transition on a
//! `watch` channel, drives the [`ConnectivitySignal`] and forwards named
//! events to the [`InvalidationBridge`]. Disconnection is a state change,
//! never an error; the task reconnects with capped exponential backoff until
//! shut down.

mod backoff;
mod transport;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uds_config::PushConfig;
use uds_protocol::socketio::ROOT_NAMESPACE;
use uds_protocol::{EnginePacket, OpenHandshake, SocketPacket};

use crate::bridge::InvalidationBridge;
use crate::connectivity::ConnectivitySignal;
use crate::errors::PushError;

pub use backoff::ReconnectPolicy;
pub use transport::{PushLink, PushTransport, WebSocketTransport};

use backoff::Backoff;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for PushState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PushState::Disconnected => write!(f, "disconnected"),
            PushState::Connecting => write!(f, "connecting"),
            PushState::Connected => write!(f, "connected"),
        }
    }
}

/// How a connected period ended.
enum LinkEnd {
    Shutdown,
    Lost(String),
}

/// Push channel client, configured and not yet running.
pub struct PushClient {
    transport: Arc<dyn PushTransport>,
    bridge: Arc<InvalidationBridge>,
    connectivity: ConnectivitySignal,
    token: Option<String>,
    reconnect: ReconnectPolicy,
    connect_timeout: Duration,
}

impl PushClient {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        bridge: Arc<InvalidationBridge>,
        connectivity: ConnectivitySignal,
    ) -> Self {
        Self {
            transport,
            bridge,
            connectivity,
            token: None,
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(20),
        }
    }

    /// Token sent as `{"token": ...}` in the namespace connect packet.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Bound on transport connect plus Socket.IO handshake.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_config(self, config: &PushConfig) -> Self {
        self.with_reconnect(ReconnectPolicy::from_config(config))
            .with_connect_timeout(config.connect_timeout())
    }

    /// Start the connection task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> PushHandle {
        let (state_tx, state_rx) = watch::channel(PushState::Disconnected);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(state_tx, cancel.clone()));
        PushHandle {
            cancel,
            task: Some(task),
            state: state_rx,
        }
    }

    async fn run(self, state_tx: watch::Sender<PushState>, cancel: CancellationToken) {
        let mut backoff = Backoff::new(self.reconnect);
        info!(event = "core.push.started");

        loop {
            state_tx.send_replace(PushState::Connecting);
            debug!(event = "core.push.connect_started");

            let attempt = tokio::select! {
                _ = cancel.cancelled() => break,
                attempt = timeout(self.connect_timeout, self.establish()) => attempt,
            };

            match attempt {
                Ok(Ok((link, handshake))) => {
                    backoff.reset();
                    state_tx.send_replace(PushState::Connected);
                    self.connectivity.on_open();
                    info!(
                        event = "core.push.connected",
                        sid = %handshake.sid,
                        ping_interval_ms = handshake.ping_interval,
                    );

                    let end = self.serve(link, &handshake, &cancel).await;

                    self.connectivity.on_close();
                    state_tx.send_replace(PushState::Disconnected);
                    match end {
                        LinkEnd::Shutdown => break,
                        LinkEnd::Lost(reason) => {
                            info!(event = "core.push.disconnected", reason = %reason);
                        }
                    }
                }
                Ok(Err(e)) => {
                    state_tx.send_replace(PushState::Disconnected);
                    warn!(event = "core.push.connect_failed", error = %e);
                }
                Err(_) => {
                    state_tx.send_replace(PushState::Disconnected);
                    warn!(
                        event = "core.push.connect_failed",
                        error = %PushError::HandshakeTimeout,
                    );
                }
            }

            let delay = backoff.next_delay();
            debug!(event = "core.push.reconnect_scheduled", delay_ms = delay.as_millis() as u64);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        state_tx.send_replace(PushState::Disconnected);
        info!(event = "core.push.stopped");
    }

    /// Open a link and complete the Engine.IO open plus Socket.IO namespace
    /// connect handshake.
    async fn establish(&self) -> Result<(PushLink, OpenHandshake), PushError> {
        let mut link = self.transport.connect().await?;

        let handshake = match next_packet(&mut link).await? {
            EnginePacket::Open(handshake) => handshake,
            other => {
                return Err(PushError::Protocol {
                    message: format!("expected open packet, got {:?}", other),
                });
            }
        };

        let auth = self.token.as_ref().map(|token| json!({ "token": token }));
        send(&link, &EnginePacket::Message(SocketPacket::connect(auth))).await?;

        loop {
            match next_packet(&mut link).await? {
                EnginePacket::Message(SocketPacket::Connect { namespace, .. })
                    if namespace == ROOT_NAMESPACE =>
                {
                    return Ok((link, handshake));
                }
                EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                    return Err(PushError::Rejected { message });
                }
                EnginePacket::Ping(data) => send(&link, &EnginePacket::Pong(data)).await?,
                EnginePacket::Close => {
                    return Err(PushError::Protocol {
                        message: "closed during handshake".to_string(),
                    });
                }
                other => debug!(event = "core.push.handshake_packet_ignored", packet = ?other),
            }
        }
    }

    /// Run a connected link until it is lost or shut down.
    async fn serve(
        &self,
        mut link: PushLink,
        handshake: &OpenHandshake,
        cancel: &CancellationToken,
    ) -> LinkEnd {
        let silence_limit =
            Duration::from_millis(handshake.ping_interval.saturating_add(handshake.ping_timeout));
        let mut deadline = Instant::now() + silence_limit;

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    let goodbye = EnginePacket::Message(SocketPacket::disconnect());
                    let _ = link.outgoing.send(goodbye.encode()).await;
                    return LinkEnd::Shutdown;
                }
                _ = sleep_until(deadline) => return LinkEnd::Lost("ping timeout".to_string()),
                frame = link.incoming.recv() => frame,
            };

            let text = match frame {
                None => return LinkEnd::Lost("transport closed".to_string()),
                Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                Some(Ok(text)) => text,
            };
            deadline = Instant::now() + silence_limit;

            let packet = match EnginePacket::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!(event = "core.push.frame_decode_failed", error = %e);
                    continue;
                }
            };

            match packet {
                EnginePacket::Ping(data) => {
                    if send(&link, &EnginePacket::Pong(data)).await.is_err() {
                        return LinkEnd::Lost("transport closed".to_string());
                    }
                }
                EnginePacket::Close => return LinkEnd::Lost("server closed".to_string()),
                EnginePacket::Message(SocketPacket::Event {
                    namespace,
                    name,
                    args,
                    ..
                }) if namespace == ROOT_NAMESPACE => {
                    let payload = args.into_iter().next().unwrap_or(Value::Null);
                    let invalidated = self.bridge.on_event(&name, &payload);
                    debug!(
                        event = "core.push.event_received",
                        name = %name,
                        invalidated = invalidated,
                    );
                }
                EnginePacket::Message(SocketPacket::Disconnect { namespace })
                    if namespace == ROOT_NAMESPACE =>
                {
                    return LinkEnd::Lost("server disconnect".to_string());
                }
                EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                    return LinkEnd::Lost(message);
                }
                other => debug!(event = "core.push.packet_ignored", packet = ?other),
            }
        }
    }
}

async fn next_packet(link: &mut PushLink) -> Result<EnginePacket, PushError> {
    loop {
        let text = match link.incoming.recv().await {
            Some(frame) => frame?,
            None => {
                return Err(PushError::Transport {
                    message: "link closed".to_string(),
                });
            }
        };
        match EnginePacket::decode(&text) {
            Ok(packet) => return Ok(packet),
            Err(e) => warn!(event = "core.push.frame_decode_failed", error = %e),
        }
    }
}

async fn send(link: &PushLink, packet: &EnginePacket) -> Result<(), PushError> {
    link.outgoing
        .send(packet.encode())
        .await
        .map_err(|_| PushError::Transport {
            message: "link closed".to_string(),
        })
}

/// Handle to a running push client.
///
/// Dropping the handle stops the task without waiting for it.
#[derive(Debug)]
pub struct PushHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<PushState>,
}

impl PushHandle {
    pub fn state(&self) -> PushState {
        *self.state.borrow()
    }

    /// Receiver for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PushState> {
        self.state.clone()
    }

    /// Intentional close: leave the namespace if connected and stop the task.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(event = "core.push.task_join_failed", error = %e);
        }
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
