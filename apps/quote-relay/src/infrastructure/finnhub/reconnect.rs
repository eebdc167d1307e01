//! Reconnection Policy
//!
//! Fixed-delay reconnection with no attempt limit, plus a single-flight
//! guard so a client runs at most one connection loop, and so schedules at
//! most one reconnect at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
        }
    }
}

/// Reconnection policy. Attempts are unbounded; the feed is long-lived.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt. Increments the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.config.delay
    }

    /// Reset the attempt counter after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Attempts since the last successful connection.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }
}

// =============================================================================
// Single-flight Guard
// =============================================================================

/// Allows at most one connection loop, and with it at most one scheduled
/// or in-progress reconnect, at a time.
#[derive(Debug, Clone, Default)]
pub struct ReconnectGuard {
    in_flight: Arc<AtomicBool>,
}

impl ReconnectGuard {
    /// Create an idle guard.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot. Returns `None` if it is already held; the slot is
    /// released when the ticket drops.
    #[must_use]
    pub fn try_begin(&self) -> Option<ReconnectTicket> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ReconnectTicket {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    /// Whether the slot is held.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof of holding the slot.
#[derive(Debug)]
pub struct ReconnectTicket {
    in_flight: Arc<AtomicBool>,
}

impl Drop for ReconnectTicket {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());

        for _ in 0..10 {
            assert_eq!(policy.next_delay(), Duration::from_secs(5));
        }
        assert_eq!(policy.attempt_count(), 10);
    }

    #[test]
    fn reset_clears_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let _ = policy.next_delay();
        let _ = policy.next_delay();

        policy.reset();
        assert_eq!(policy.attempt_count(), 0);
    }

    #[test]
    fn guard_is_single_flight() {
        let guard = ReconnectGuard::new();

        let ticket = guard.try_begin().unwrap();
        assert!(guard.is_pending());
        assert!(guard.try_begin().is_none());
        assert!(guard.clone().try_begin().is_none());

        drop(ticket);
        assert!(!guard.is_pending());
        assert!(guard.try_begin().is_some());
    }
}
