//! Broadcast Hub
//!
//! Fans derived quotes out to every connected session over a tokio
//! broadcast channel and keeps the latest quote per symbol for snapshots.
//!
//! # Snapshot handoff
//!
//! `publish` updates the cache and sends under the same lock that `connect`
//! holds while it copies the cache and subscribes a receiver. A quote is
//! therefore either in a new session's snapshot or in its receiver, never
//! both and never neither.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::metrics;
use crate::application::ports::QuotePublisher;
use crate::domain::streaming::DerivedQuote;
use crate::domain::subscription::Symbol;

/// Configuration for the broadcast hub.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Live channel capacity. Receivers further behind than this lag.
    pub capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

/// A registered downstream session.
#[derive(Debug)]
pub struct Session {
    /// Session identifier, used to disconnect.
    pub id: Uuid,
    /// Latest quote per symbol at registration time, sorted by symbol.
    pub snapshot: Vec<DerivedQuote>,
    /// Live quotes published after the snapshot was taken.
    pub receiver: broadcast::Receiver<DerivedQuote>,
}

#[derive(Debug, Default)]
struct HubState {
    latest: HashMap<Symbol, DerivedQuote>,
    sessions: HashSet<Uuid>,
}

/// Latest-quote cache plus live fan-out.
#[derive(Debug)]
pub struct BroadcastHub {
    state: Mutex<HubState>,
    quotes_tx: broadcast::Sender<DerivedQuote>,
}

impl BroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            quotes_tx: broadcast::channel(config.capacity.max(1)).0,
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Cache `quote` as the latest for its symbol and push it to every
    /// session. Returns the number of receivers reached.
    pub fn send_quote(&self, quote: DerivedQuote) -> usize {
        let mut state = self.state.lock();
        state.latest.insert(quote.symbol.clone(), quote.clone());
        // No receivers is not an error; the cache still updates.
        self.quotes_tx.send(quote).unwrap_or(0)
    }

    /// Register a session: snapshot the cache and subscribe in one step.
    #[must_use]
    pub fn connect(&self) -> Session {
        let mut state = self.state.lock();
        let mut snapshot: Vec<DerivedQuote> = state.latest.values().cloned().collect();
        let receiver = self.quotes_tx.subscribe();
        let id = Uuid::new_v4();
        state.sessions.insert(id);
        let sessions = state.sessions.len();
        drop(state);

        snapshot.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        metrics::set_sessions(sessions);
        tracing::debug!(session_id = %id, snapshot = snapshot.len(), sessions, "Session connected");

        Session {
            id,
            snapshot,
            receiver,
        }
    }

    /// Remove a session. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: Uuid) -> bool {
        let mut state = self.state.lock();
        let removed = state.sessions.remove(&id);
        let sessions = state.sessions.len();
        drop(state);

        if removed {
            metrics::set_sessions(sessions);
            tracing::debug!(session_id = %id, sessions, "Session disconnected");
        }
        removed
    }

    /// Drop the cached quote for `symbol`.
    pub fn evict_symbol(&self, symbol: &Symbol) -> bool {
        self.state.lock().latest.remove(symbol).is_some()
    }

    /// Latest cached quote for `symbol`.
    #[must_use]
    pub fn latest(&self, symbol: &Symbol) -> Option<DerivedQuote> {
        self.state.lock().latest.get(symbol).cloned()
    }

    /// Get statistics about the hub.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        let state = self.state.lock();
        BroadcastStats {
            sessions: state.sessions.len(),
            cached_quotes: state.latest.len(),
            receivers: self.quotes_tx.receiver_count(),
        }
    }
}

impl QuotePublisher for BroadcastHub {
    fn publish(&self, quote: DerivedQuote) {
        self.send_quote(quote);
    }

    fn evict(&self, symbol: &Symbol) {
        if self.evict_symbol(symbol) {
            tracing::debug!(symbol = %symbol, "Evicted latest quote");
        }
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Statistics about the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Registered sessions.
    pub sessions: usize,
    /// Symbols with a cached latest quote.
    pub cached_quotes: usize,
    /// Live channel receivers.
    pub receivers: usize,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::{PriceTick, enrich};

    fn quote(symbol: &str, price: f64, t: i64) -> DerivedQuote {
        enrich(
            &PriceTick {
                symbol: Symbol::parse(symbol).unwrap(),
                price,
                event_timestamp: t,
            },
            None,
        )
    }

    #[test]
    fn hub_creation() {
        let hub = BroadcastHub::with_defaults();
        assert_eq!(hub.stats(), BroadcastStats::default());
    }

    #[test]
    fn publish_without_sessions_updates_cache() {
        let hub = BroadcastHub::with_defaults();
        assert_eq!(hub.send_quote(quote("AAPL", 1.0, 1)), 0);
        assert_eq!(hub.stats().cached_quotes, 1);
    }

    #[test]
    fn cache_keeps_latest_per_symbol() {
        let hub = BroadcastHub::with_defaults();
        hub.send_quote(quote("AAPL", 1.0, 1));
        hub.send_quote(quote("AAPL", 2.0, 2));
        hub.send_quote(quote("MSFT", 3.0, 3));

        let session = hub.connect();
        let prices: Vec<_> = session.snapshot.iter().map(|q| (q.symbol.to_string(), q.price)).collect();
        assert_eq!(prices, vec![("AAPL".to_string(), 2.0), ("MSFT".to_string(), 3.0)]);
    }

    #[tokio::test]
    async fn multiple_sessions_get_same_quote() {
        let hub = BroadcastHub::with_defaults();
        let mut s1 = hub.connect();
        let mut s2 = hub.connect();

        assert_eq!(hub.send_quote(quote("AAPL", 1.0, 1)), 2);

        assert_eq!(s1.receiver.recv().await.unwrap().event_timestamp, 1);
        assert_eq!(s2.receiver.recv().await.unwrap().event_timestamp, 1);
    }

    #[tokio::test]
    async fn snapshot_then_live_without_overlap() {
        let hub = BroadcastHub::with_defaults();
        hub.send_quote(quote("AAPL", 1.0, 1));

        let mut session = hub.connect();
        hub.send_quote(quote("AAPL", 2.0, 2));

        assert_eq!(session.snapshot.len(), 1);
        assert_eq!(session.snapshot[0].event_timestamp, 1);
        assert_eq!(session.receiver.recv().await.unwrap().event_timestamp, 2);
        assert!(session.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn concurrent_connects_never_duplicate() {
        let hub = Arc::new(BroadcastHub::with_defaults());

        let publisher = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for t in 1..=500 {
                    hub.send_quote(quote("AAPL", 100.0, t));
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut sessions = Vec::new();
        for _ in 0..20 {
            sessions.push(hub.connect());
            tokio::task::yield_now().await;
        }
        publisher.await.unwrap();

        for mut session in sessions {
            let mut seen: Vec<i64> = session.snapshot.iter().map(|q| q.event_timestamp).collect();
            while let Ok(q) = session.receiver.try_recv() {
                seen.push(q.event_timestamp);
            }
            let mut deduped = seen.clone();
            deduped.dedup();
            assert_eq!(seen, deduped, "timestamp delivered twice");
            assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order: {seen:?}");
        }
    }

    #[test]
    fn disconnect_is_idempotent() {
        let hub = BroadcastHub::with_defaults();
        let session = hub.connect();
        assert_eq!(hub.stats().sessions, 1);

        assert!(hub.disconnect(session.id));
        assert!(!hub.disconnect(session.id));
        assert_eq!(hub.stats().sessions, 0);
    }

    #[tokio::test]
    async fn disconnect_does_not_affect_others() {
        let hub = BroadcastHub::with_defaults();
        let gone = hub.connect();
        let mut stays = hub.connect();

        hub.disconnect(gone.id);
        drop(gone);
        hub.send_quote(quote("AAPL", 1.0, 7));

        assert_eq!(stays.receiver.recv().await.unwrap().event_timestamp, 7);
        assert_eq!(hub.stats().receivers, 1);
    }

    #[test]
    fn evict_removes_from_snapshot() {
        let hub = BroadcastHub::with_defaults();
        hub.send_quote(quote("AAPL", 1.0, 1));

        QuotePublisher::evict(&hub, &Symbol::parse("AAPL").unwrap());

        assert!(hub.connect().snapshot.is_empty());
        assert!(hub.latest(&Symbol::parse("AAPL").unwrap()).is_none());
    }
}
