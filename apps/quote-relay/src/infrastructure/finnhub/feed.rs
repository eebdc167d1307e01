//! Upstream Feed Connection
//!
//! Owns the single WebSocket connection to the Finnhub trade stream.
//!
//! # Stream URL
//!
//! `wss://ws.finnhub.io?token=<key>`
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Closing -> Disconnected   (shutdown)
//!                     |             |
//!                     +-------------+--> Reconnecting -> Connecting    (any failure)
//! ```
//!
//! On every transition to `Connected` the client sends one subscribe frame
//! per symbol in the registry. Subscribe and unsubscribe requests made while
//! not connected are dropped; the next resync covers them. Failures of any
//! kind (refused connection, TLS, server close, heartbeat timeout) wait a
//! fixed delay and try again, forever. Only cancellation sends a normal
//! close and stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, FinnhubCodec, Inbound};
use super::heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
use super::messages::ControlFrame;
use super::reconnect::{ReconnectConfig, ReconnectGuard, ReconnectPolicy};
use crate::application::metrics;
use crate::application::ports::UpstreamControl;
use crate::application::services::SubscriptionRegistry;
use crate::domain::streaming::{ConnectionState, FeedEvent};
use crate::domain::subscription::Symbol;
use crate::infrastructure::config::ApiKey;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end one connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error (including connect, DNS and TLS failures).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Server sent a close frame.
    #[error("closed by server (code {code:?}): {reason}")]
    ClosedByServer {
        /// Close code, if the frame carried one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Stream ended without a close frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// No response to a ping in time.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket base URL (without token).
    pub url: String,
    /// Finnhub API key.
    pub api_key: ApiKey,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl FeedClientConfig {
    /// Create a configuration with default reconnect and heartbeat settings.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: ApiKey) -> Self {
        Self {
            url: url.into(),
            api_key,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// URL with the token query parameter appended.
    #[must_use]
    pub fn connect_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{separator}token={}", self.url, self.api_key.expose())
    }
}

// =============================================================================
// Status
// =============================================================================

/// Observable connection status, shared with the health endpoint.
#[derive(Debug)]
pub struct FeedStatus {
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    reconnects: AtomicU64,
    ticks_received: AtomicU64,
    ticks_dropped: AtomicU64,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            reconnects: AtomicU64::new(0),
            ticks_received: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
        }
    }
}

/// Point-in-time copy of [`FeedStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Last successful connect.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Reconnection attempts since start.
    pub reconnects: u64,
    /// Valid ticks received since start.
    pub ticks_received: u64,
    /// Trade entries dropped by validation since start.
    pub ticks_dropped: u64,
}

impl FeedStatus {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Reconnection attempts since start.
    #[must_use]
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Valid ticks received since start.
    #[must_use]
    pub fn ticks_received(&self) -> u64 {
        self.ticks_received.load(Ordering::Relaxed)
    }

    /// Copy of all fields.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatusSnapshot {
        FeedStatusSnapshot {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            reconnects: self.reconnects(),
            ticks_received: self.ticks_received(),
            ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
        }
    }

    fn transition(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state == next {
            return;
        }
        if !state.can_transition_to(next) {
            tracing::warn!(from = state.as_str(), to = next.as_str(), "Unexpected state transition");
        }
        tracing::debug!(from = state.as_str(), to = next.as_str(), "Feed state");
        *state = next;
        drop(state);

        if next == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
        }
        metrics::set_upstream_connected(next == ConnectionState::Connected);
    }
}

// =============================================================================
// Feed Client
// =============================================================================

/// Single upstream connection with resync and reconnect.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: FinnhubCodec,
    registry: Arc<SubscriptionRegistry>,
    event_tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
    status: Arc<FeedStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ControlFrame>>>,
    reconnect_guard: ReconnectGuard,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("url", &self.config.url)
            .field("state", &self.status.state())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Create a new feed client.
    #[must_use]
    pub fn new(
        config: FeedClientConfig,
        registry: Arc<SubscriptionRegistry>,
        event_tx: mpsc::Sender<FeedEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: FinnhubCodec::new(),
            registry,
            event_tx,
            cancel,
            status: Arc::new(FeedStatus::default()),
            outbound: Mutex::new(None),
            reconnect_guard: ReconnectGuard::new(),
        }
    }

    /// Shared status handle.
    #[must_use]
    pub fn status(&self) -> Arc<FeedStatus> {
        Arc::clone(&self.status)
    }

    /// Run the connection loop until cancelled.
    ///
    /// Returns at once if another `run` on this client is still active.
    pub async fn run(self: Arc<Self>) {
        let Some(_ticket) = self.reconnect_guard.try_begin() else {
            tracing::warn!("Feed loop already running");
            return;
        };
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let result = self.connect_and_run(&mut policy).await;
            let was_connected = self.status.state() == ConnectionState::Connected
                || self.status.state() == ConnectionState::Closing;
            self.detach_outbound();

            if let Err(e) = result {
                tracing::warn!(error = %e, "Feed connection lost");
                if was_connected {
                    self.emit(FeedEvent::Disconnected).await;
                }

                self.status.transition(ConnectionState::Reconnecting);
                self.status.reconnects.fetch_add(1, Ordering::Relaxed);
                metrics::record_reconnect();

                let delay = policy.next_delay();
                let attempt = policy.attempt_count();
                tracing::info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnecting to feed"
                );
                self.emit(FeedEvent::Reconnecting { attempt }).await;

                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
            } else {
                if was_connected {
                    self.emit(FeedEvent::Disconnected).await;
                }
                break;
            }
        }

        self.status.transition(ConnectionState::Disconnected);
        tracing::info!("Feed client stopped");
    }

    /// Connect, resync and pump frames until an error or cancellation.
    ///
    /// `Ok(())` means we closed the connection ourselves.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        self.status.transition(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to feed");

        let connect = tokio_tungstenite::connect_async(self.config.connect_url());
        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = connect => result?,
        };
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let resubscribed = self.attach_outbound(out_tx);
        self.status.transition(ConnectionState::Connected);
        policy.reset();
        tracing::info!(resubscribed, "Feed connected");
        self.emit(FeedEvent::Connected { resubscribed }).await;

        let mut heartbeat = Heartbeat::new(self.config.heartbeat.clone(), Instant::now());
        let mut ticker = tokio::time::interval(heartbeat.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    self.status.transition(ConnectionState::Closing);
                    self.detach_outbound();
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "shutdown".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        tracing::debug!(error = %e, "Close frame not delivered");
                    }
                    return Ok(());
                }
                Some(frame) = out_rx.recv() => {
                    let text = self.codec.encode(&frame)?;
                    tracing::debug!(action = ?frame.action, symbol = %frame.symbol, "Sending control frame");
                    write.send(Message::Text(text.into())).await?;
                }
                _ = ticker.tick() => {
                    match heartbeat.on_tick(Instant::now()) {
                        HeartbeatAction::SendPing => {
                            write.send(Message::Ping(Vec::new().into())).await?;
                        }
                        HeartbeatAction::TimedOut => return Err(FeedClientError::HeartbeatTimeout),
                        HeartbeatAction::Idle => {}
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            heartbeat.record_activity(Instant::now());
                            self.handle_text(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            heartbeat.record_activity(Instant::now());
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_) | Message::Binary(_))) => {
                            heartbeat.record_activity(Instant::now());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(FeedClientError::ClosedByServer {
                                code: frame.as_ref().map(|f| u16::from(f.code)),
                                reason: frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default(),
                            });
                        }
                        Some(Ok(Message::Frame(_))) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Decode a text frame and forward valid ticks.
    async fn handle_text(&self, text: &str) {
        let inbound = match self.codec.decode(text) {
            Ok(inbound) => inbound,
            Err(e) => {
                self.status.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_ticks_dropped(1);
                tracing::warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        match inbound {
            Inbound::Trades { ticks, dropped } => {
                if dropped > 0 {
                    let dropped = u64::try_from(dropped).unwrap_or(u64::MAX);
                    self.status.ticks_dropped.fetch_add(dropped, Ordering::Relaxed);
                    metrics::record_ticks_dropped(dropped);
                    tracing::warn!(dropped, "Dropped invalid trade entries");
                }
                for tick in ticks {
                    self.status.ticks_received.fetch_add(1, Ordering::Relaxed);
                    self.emit(FeedEvent::Tick(tick)).await;
                }
            }
            Inbound::Ping => tracing::trace!("Feed ping"),
            Inbound::Error(msg) => tracing::warn!(msg = %msg, "Feed error message"),
            Inbound::Other(kind) => tracing::trace!(kind = %kind, "Ignoring frame"),
        }
    }

    /// Install the outbound channel and queue a subscribe for every
    /// registry symbol. Returns the number queued.
    fn attach_outbound(&self, tx: mpsc::UnboundedSender<ControlFrame>) -> usize {
        let mut outbound = self.outbound.lock();
        let symbols = self.registry.list();
        for symbol in symbols.iter() {
            let _ = tx.send(ControlFrame::subscribe(symbol.as_str()));
        }
        *outbound = Some(tx);
        symbols.len()
    }

    fn detach_outbound(&self) {
        self.outbound.lock().take();
    }

    fn send_control(&self, frame: ControlFrame) -> bool {
        self.outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    async fn emit(&self, event: FeedEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::trace!("Feed event receiver gone");
        }
    }
}

impl UpstreamControl for FeedClient {
    fn subscribe(&self, symbol: &Symbol) -> bool {
        self.send_control(ControlFrame::subscribe(symbol.as_str()))
    }

    fn unsubscribe(&self, symbol: &Symbol) -> bool {
        self.send_control(ControlFrame::unsubscribe(symbol.as_str()))
    }
}

// =============================================================================
// Tests
// =============================================================================
