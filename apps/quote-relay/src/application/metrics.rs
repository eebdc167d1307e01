//! Relay Metrics
//!
//! Names, labels and recording helpers for the relay's counters, gauges and
//! histogram. Only the `metrics` facade is used here; the recorder that
//! exports them is installed by the infrastructure layer.
//!
//! # Metrics Categories
//!
//! - **Ticks**: received, dropped at the decode boundary, published quotes
//! - **Upstream**: connection state and reconnects
//! - **Sessions**: connected downstream sessions
//! - **Reference data**: fetch outcomes and cached entries
//! - **Persistence**: failed writes

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

// =============================================================================
// Metric Registration
// =============================================================================

/// Register descriptions for every relay metric with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(
        "quote_relay_ticks_received_total",
        "Trade ticks accepted from the upstream feed"
    );
    describe_counter!(
        "quote_relay_ticks_dropped_total",
        "Trade entries dropped by upstream payload validation"
    );
    describe_counter!(
        "quote_relay_quotes_published_total",
        "Derived quotes pushed to the broadcast hub"
    );
    describe_counter!(
        "quote_relay_reconnects_total",
        "Upstream reconnection attempts"
    );
    describe_counter!(
        "quote_relay_reference_fetch_total",
        "Reference fetch outcomes per symbol"
    );
    describe_counter!(
        "quote_relay_persist_failures_total",
        "Failed writes of persisted state"
    );

    describe_gauge!(
        "quote_relay_upstream_connected",
        "1 while the upstream feed is connected"
    );
    describe_gauge!("quote_relay_sessions", "Connected downstream sessions");
    describe_gauge!(
        "quote_relay_subscriptions",
        "Symbols in the subscription registry"
    );
    describe_gauge!(
        "quote_relay_reference_entries",
        "Entries in the reference price store"
    );

    describe_histogram!(
        "quote_relay_tick_processing_seconds",
        "Time from tick receipt to broadcast"
    );
}

// =============================================================================
// Labels
// =============================================================================

/// Outcome of one symbol in a reference batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Fetched and stored.
    Ok,
    /// One attempt was rate limited.
    RateLimited,
    /// Gave up after the attempt budget or a permanent error.
    Failed,
    /// Cached entry was fresh.
    SkippedFresh,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
            Self::SkippedFresh => "skipped_fresh",
        }
    }
}

/// Persisted value a write failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTarget {
    /// Subscription set.
    Subscriptions,
    /// Reference price cache.
    References,
}

impl PersistTarget {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Subscriptions => "subscriptions",
            Self::References => "references",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an accepted tick.
pub fn record_tick_received() {
    counter!("quote_relay_ticks_received_total").increment(1);
}

/// Record trade entries dropped at the decode boundary.
pub fn record_ticks_dropped(count: u64) {
    if count > 0 {
        counter!("quote_relay_ticks_dropped_total").increment(count);
    }
}

/// Record a published quote.
pub fn record_quote_published() {
    counter!("quote_relay_quotes_published_total").increment(1);
}

/// Record an upstream reconnection attempt.
pub fn record_reconnect() {
    counter!("quote_relay_reconnects_total").increment(1);
}

/// Record a reference fetch outcome.
pub fn record_fetch_outcome(outcome: FetchOutcome) {
    counter!(
        "quote_relay_reference_fetch_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a failed persist.
pub fn record_persist_failure(target: PersistTarget) {
    counter!(
        "quote_relay_persist_failures_total",
        "target" => target.as_str()
    )
    .increment(1);
}

/// Update the upstream connection gauge.
pub fn set_upstream_connected(connected: bool) {
    gauge!("quote_relay_upstream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the session gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions(count: usize) {
    gauge!("quote_relay_sessions").set(count as f64);
}

/// Update the subscription gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(count: usize) {
    gauge!("quote_relay_subscriptions").set(count as f64);
}

/// Update the reference entry gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_reference_entries(count: usize) {
    gauge!("quote_relay_reference_entries").set(count as f64);
}

/// Record tick processing duration.
pub fn record_tick_processing(duration: Duration) {
    histogram!("quote_relay_tick_processing_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
