//! Persistent connection to the recognition/response service
//!
//! Owns exactly one WebSocket transport at a time. Handles the
//! authenticated handshake, keep-alive, reconnection with exponential
//! backoff, and circuit breaking. Connection failures are never surfaced
//! as panics or errors from `connect`; they are observable through the
//! state channel and counters.

mod backoff;
mod breaker;

pub use backoff::{base_delay_for_attempt, delay_for_attempt};
pub use breaker::CircuitBreaker;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::config::ReconnectConfig;
use crate::protocol::{ClientPayload, Envelope, ServerEnvelope, VoiceFrame};
use crate::{Error, Result};

/// Interval between keep-alive pings while connected
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport; no reconnect pending
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Transport established and authenticated
    Connected,
    /// Last attempt failed; reconnect may be pending
    Error,
}

/// Events dispatched to the registered observer queue
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Transport established
    Connected,
    /// Transport lost; `clean` when induced by `disconnect()`
    Disconnected { clean: bool },
    /// Circuit breaker opened; attempts suppressed for the cooldown
    BreakerOpen,
    /// A well-formed envelope arrived from the service
    Envelope(ServerEnvelope),
}

/// State guarded together so transitions and counters stay consistent
struct Shared {
    state: ConnectionState,
    attempts: u32,
    auto_reconnect: bool,
    breaker: CircuitBreaker,
    last_failure: Option<Instant>,
}

/// Manages the persistent connection to the service
pub struct ConnectionManager {
    endpoint: String,
    credential: SecretString,
    policy: ReconnectConfig,
    shared: Mutex<Shared>,
    state_tx: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ConnectionEvent>,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager for the given endpoint and credential.
    ///
    /// Incoming envelopes and lifecycle notices are pushed onto `events`;
    /// the receiver is the session runtime's single-consumer queue.
    #[must_use]
    pub fn new(
        endpoint: &str,
        credential: SecretString,
        policy: ReconnectConfig,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let breaker = CircuitBreaker::new(policy.breaker_threshold, policy.breaker_cooldown);

        Arc::new(Self {
            endpoint: endpoint.to_string(),
            credential,
            policy,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                attempts: 0,
                auto_reconnect: false,
                breaker,
                last_failure: None,
            }),
            state_tx,
            events,
            sink: tokio::sync::Mutex::new(None),
            reader_task: Mutex::new(None),
            keepalive_task: Mutex::new(None),
            reconnect_task: Mutex::new(None),
        })
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().map_or(ConnectionState::Error, |s| s.state)
    }

    /// Subscribe to connection state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Consecutive failed attempts since the last successful connection
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.shared
            .lock()
            .map_or(0, |s| s.breaker.consecutive_failures())
    }

    /// Whether the circuit breaker is currently suppressing attempts
    #[must_use]
    pub fn breaker_open(&self) -> bool {
        self.shared.lock().is_ok_and(|s| s.breaker.is_open())
    }

    /// Reconnect attempts made since the last successful connection
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().map_or(0, |s| s.attempts)
    }

    /// When the most recent connection attempt failed
    #[must_use]
    pub fn last_failure(&self) -> Option<Instant> {
        self.shared.lock().ok().and_then(|s| s.last_failure)
    }

    /// Open the connection.
    ///
    /// No-op while already `Connected` or `Connecting`. Re-enables
    /// automatic reconnection after a prior `disconnect()`. Failures are
    /// not returned; they drive the reconnect policy and are observable
    /// via [`ConnectionManager::state`].
    pub fn connect(self: &Arc<Self>) {
        {
            let Ok(mut shared) = self.shared.lock() else {
                return;
            };
            if matches!(
                shared.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                tracing::debug!(state = ?shared.state, "connect is a no-op");
                return;
            }
            shared.auto_reconnect = true;
            shared.attempts = 0;
        }

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.try_connect().await;
        });
        self.store_task(&self.reconnect_task, handle);
    }

    /// Close the connection and disable automatic reconnection.
    ///
    /// Cancels any pending reconnect timer and closes the transport with a
    /// normal close frame. Idempotent.
    pub async fn disconnect(&self) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.auto_reconnect = false;
        }
        self.abort_task(&self.reconnect_task);
        self.abort_task(&self.reader_task);
        self.abort_task(&self.keepalive_task);

        let mut sink = self.sink.lock().await;
        if let Some(mut ws) = sink.take() {
            if let Err(e) = ws.send(Message::Close(None)).await {
                tracing::debug!(error = %e, "close frame not delivered");
            }
            tracing::info!("disconnected");
        }
        drop(sink);

        self.set_state(ConnectionState::Disconnected);
        let _ = self
            .events
            .send(ConnectionEvent::Disconnected { clean: true })
            .await;
    }

    /// Send a control envelope.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` unless the state is `Connected`;
    /// `Error::Transport` if the write itself fails. No outbound queueing
    /// is performed.
    pub async fn send(&self, payload: ClientPayload) -> Result<()> {
        let text = serde_json::to_string(&Envelope::new(payload))?;
        self.send_message(Message::Text(text.into())).await
    }

    /// Send one binary audio frame.
    ///
    /// # Errors
    ///
    /// Same contract as [`ConnectionManager::send`].
    pub async fn send_audio(&self, frame: VoiceFrame) -> Result<()> {
        self.send_message(Message::Binary(frame.encode().into()))
            .await
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }

        let mut sink = self.sink.lock().await;
        let Some(ws) = sink.as_mut() else {
            return Err(Error::NotConnected);
        };
        ws.send(message)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// One connection attempt; schedules the next one on failure
    async fn try_connect(self: Arc<Self>) {
        let suppressed = {
            let Ok(mut shared) = self.shared.lock() else {
                return;
            };
            if !shared.breaker.attempt_allowed(Instant::now()) {
                tracing::warn!("connection attempt suppressed by circuit breaker");
                shared.state = ConnectionState::Disconnected;
                true
            } else {
                shared.state = ConnectionState::Connecting;
                false
            }
        };
        if suppressed {
            let _ = self.state_tx.send(ConnectionState::Disconnected);
            self.schedule_reconnect().await;
            return;
        }
        let _ = self.state_tx.send(ConnectionState::Connecting);

        let request = match self.endpoint_with_credential() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "invalid endpoint");
                self.set_state(ConnectionState::Error);
                return;
            }
        };

        tracing::debug!(endpoint = %self.endpoint, "connecting");

        match connect_async(request).await {
            Ok((stream, _)) => self.on_connected(stream).await,
            Err(e) => {
                tracing::warn!(error = %e, "connection attempt failed");
                self.on_attempt_failed().await;
            }
        }
    }

    async fn on_connected(self: &Arc<Self>, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) {
        let (sink, reader) = stream.split();
        *self.sink.lock().await = Some(sink);

        if let Ok(mut shared) = self.shared.lock() {
            shared.state = ConnectionState::Connected;
            shared.attempts = 0;
            shared.breaker.record_success();
        }
        let _ = self.state_tx.send(ConnectionState::Connected);
        tracing::info!(endpoint = %self.endpoint, "connected");

        let _ = self.events.send(ConnectionEvent::Connected).await;

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.read_loop(reader).await;
        });
        self.store_task(&self.reader_task, handle);

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.keepalive_loop().await;
        });
        self.store_task(&self.keepalive_task, handle);
    }

    async fn on_attempt_failed(self: &Arc<Self>) {
        let newly_open = {
            let Ok(mut shared) = self.shared.lock() else {
                return;
            };
            let was_open = shared.breaker.is_open();
            shared.breaker.record_failure(Instant::now());
            shared.last_failure = Some(Instant::now());
            shared.state = ConnectionState::Error;
            shared.breaker.is_open() && !was_open
        };
        let _ = self.state_tx.send(ConnectionState::Error);

        if newly_open {
            let _ = self.events.send(ConnectionEvent::BreakerOpen).await;
        }

        self.schedule_reconnect().await;
    }

    /// Arm the backoff timer for the next attempt, if policy allows
    async fn schedule_reconnect(self: &Arc<Self>) {
        let delay = {
            let Ok(mut shared) = self.shared.lock() else {
                return;
            };
            if !shared.auto_reconnect {
                shared.state = ConnectionState::Disconnected;
                None
            } else if shared.attempts >= self.policy.max_attempts {
                tracing::warn!(
                    attempts = shared.attempts,
                    "reconnection abandoned; call connect() to retry"
                );
                shared.state = ConnectionState::Disconnected;
                shared.auto_reconnect = false;
                None
            } else {
                let attempt = shared.attempts;
                shared.attempts += 1;
                Some((attempt, delay_for_attempt(&self.policy, attempt)))
            }
        };

        let Some((attempt, delay)) = delay else {
            let _ = self.state_tx.send(ConnectionState::Disconnected);
            return;
        };

        tracing::info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.try_connect().await;
        });
        self.store_task(&self.reconnect_task, handle);
    }

    /// Consume incoming frames until the transport drops
    async fn read_loop(self: Arc<Self>, mut reader: WsStream) {
        while let Some(message) = reader.next().await {
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEnvelope>(&text) {
                    Ok(envelope) => {
                        let _ = self.events.send(ConnectionEvent::Envelope(envelope)).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed envelope");
                    }
                },
                Ok(Message::Close(frame)) => {
                    tracing::info!(frame = ?frame, "server closed connection");
                    break;
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Binary(data)) => {
                    tracing::warn!(len = data.len(), "unexpected binary frame from server");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "websocket read error");
                    break;
                }
            }
        }

        self.on_transport_lost().await;
    }

    /// Unclean close: tear down and enter the reconnect path
    async fn on_transport_lost(self: &Arc<Self>) {
        self.abort_task(&self.keepalive_task);
        *self.sink.lock().await = None;

        if let Ok(mut shared) = self.shared.lock() {
            shared.state = ConnectionState::Disconnected;
        }
        let _ = self.state_tx.send(ConnectionState::Disconnected);
        let _ = self
            .events
            .send(ConnectionEvent::Disconnected { clean: false })
            .await;

        self.schedule_reconnect().await;
    }

    async fn keepalive_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let mut sink = self.sink.lock().await;
            let Some(ws) = sink.as_mut() else { break };
            if let Err(e) = ws.send(Message::Ping(Vec::new())).await {
                tracing::debug!(error = %e, "keepalive ping failed");
                break;
            }
        }
    }

    /// Endpoint URL with the auth credential attached as a query parameter
    fn endpoint_with_credential(&self) -> Result<String> {
        let mut url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("bad endpoint {}: {e}", self.endpoint)))?;
        url.query_pairs_mut()
            .append_pair("token", self.credential.expose_secret());
        Ok(url.to_string())
    }

    fn set_state(&self, state: ConnectionState) {
        if let Ok(mut shared) = self.shared.lock() {
            shared.state = state;
        }
        let _ = self.state_tx.send(state);
    }

    fn store_task(&self, slot: &Mutex<Option<JoinHandle<()>>>, handle: JoinHandle<()>) {
        if let Ok(mut guard) = slot.lock() {
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
    }

    fn abort_task(&self, slot: &Mutex<Option<JoinHandle<()>>>) {
        if let Ok(mut guard) = slot.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        for slot in [&self.reader_task, &self.keepalive_task, &self.reconnect_task] {
            if let Ok(mut guard) = slot.lock() {
                if let Some(handle) = guard.take() {
                    handle.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<ConnectionManager>, mpsc::Receiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let manager = ConnectionManager::new(
            "wss://example.invalid/voice",
            SecretString::from("test-token"),
            ReconnectConfig::default(),
            tx,
        );
        (manager, rx)
    }

    #[test]
    fn credential_attached_as_query_parameter() {
        let (manager, _rx) = manager();
        let url = manager.endpoint_with_credential().unwrap();
        assert!(url.starts_with("wss://example.invalid/voice?token="));
        assert!(url.contains("test-token"));
    }

    #[test]
    fn starts_disconnected() {
        let (manager, _rx) = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.consecutive_failures(), 0);
        assert!(!manager.breaker_open());
    }

    #[tokio::test]
    async fn send_fails_fast_when_disconnected() {
        let (manager, _rx) = manager();
        let result = manager.send(ClientPayload::VoiceStart).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn send_audio_fails_fast_when_disconnected() {
        let (manager, _rx) = manager();
        let frame = VoiceFrame {
            seq: 0,
            timestamp_ms: 0,
            sample_rate: 16_000,
            pcm: vec![0; 32],
        };
        assert!(matches!(
            manager.send_audio(frame).await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (manager, mut rx) = manager();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Both disconnects announce a clean close
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::Disconnected { clean: true })
        );
    }
}
