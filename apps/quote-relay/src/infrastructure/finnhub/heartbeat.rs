//! Heartbeat
//!
//! Liveness tracking for the upstream socket. Any inbound frame counts as
//! activity. After `ping_interval` of silence a ping is sent; if nothing
//! arrives within `pong_timeout` of that ping the connection is dead.
//!
//! The state machine is driven by the connection's read loop with explicit
//! `Instant`s, so it has no timers of its own.

use std::time::{Duration, Instant};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Silence before a ping is sent.
    pub ping_interval: Duration,
    /// Wait after a ping before the connection is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

/// What the connection should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing to do.
    Idle,
    /// Send a ping frame.
    SendPing,
    /// No response to the last ping; drop the connection.
    TimedOut,
}

/// Per-connection heartbeat state.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
}

impl Heartbeat {
    /// Start tracking a fresh connection at `now`.
    #[must_use]
    pub const fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config,
            last_activity: now,
            ping_sent_at: None,
        }
    }

    /// Interval at which [`on_tick`](Self::on_tick) should be called.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        (self.config.ping_interval.min(self.config.pong_timeout) / 2).max(Duration::from_millis(1))
    }

    /// Record an inbound frame.
    pub const fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.ping_sent_at = None;
    }

    /// Decide what to do at `now`.
    pub fn on_tick(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(sent_at) = self.ping_sent_at {
            if now.saturating_duration_since(sent_at) >= self.config.pong_timeout {
                return HeartbeatAction::TimedOut;
            }
            return HeartbeatAction::Idle;
        }

        if now.saturating_duration_since(self.last_activity) >= self.config.ping_interval {
            self.ping_sent_at = Some(now);
            return HeartbeatAction::SendPing;
        }

        HeartbeatAction::Idle
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub const fn is_waiting(&self) -> bool {
        self.ping_sent_at.is_some()
    }
}
