//! Market Data Streaming Types
//!
//! Core domain types for the tick path: raw trade ticks from the upstream
//! feed, derived quotes sent to sessions, and the enrichment function that
//! turns one into the other.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::reference::ReferenceEntry;
use super::subscription::Symbol;

/// Decimal places kept in change fields.
const DISPLAY_DECIMALS: u32 = 2;

// =============================================================================
// Ticks
// =============================================================================

/// One trade observation for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTick {
    /// Traded symbol.
    pub symbol: Symbol,
    /// Trade price (always finite and positive).
    pub price: f64,
    /// Upstream event time in epoch milliseconds.
    pub event_timestamp: i64,
}

// =============================================================================
// Derived Quotes
// =============================================================================

/// Price movement relative to the previous close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Above previous close.
    Up,
    /// Below previous close.
    Down,
    /// Exactly at previous close.
    Flat,
    /// No reference price available.
    Unknown,
}

/// Quote published to downstream sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedQuote {
    /// Traded symbol.
    pub symbol: Symbol,
    /// Trade price.
    pub price: f64,
    /// Upstream event time in epoch milliseconds.
    pub event_timestamp: i64,
    /// Previous session close, if known.
    pub previous_close: Option<f64>,
    /// `price - previous_close`, rounded to two decimals.
    pub absolute_change: Option<f64>,
    /// Change as a percentage of the previous close, rounded to two decimals.
    pub percent_change: Option<f64>,
    /// Direction of the move.
    pub direction: Direction,
}

/// Combine a tick with its reference entry.
///
/// Both change fields are computed from unrounded inputs and only then
/// rounded, so the percentage is never derived from an already rounded
/// absolute change. A reference with a non-positive previous close is
/// treated as missing.
#[must_use]
pub fn enrich(tick: &PriceTick, reference: Option<&ReferenceEntry>) -> DerivedQuote {
    let Some(previous_close) = reference
        .map(|r| r.previous_close)
        .filter(|pc| pc.is_finite() && *pc > 0.0)
    else {
        return DerivedQuote {
            symbol: tick.symbol.clone(),
            price: tick.price,
            event_timestamp: tick.event_timestamp,
            previous_close: None,
            absolute_change: None,
            percent_change: None,
            direction: Direction::Unknown,
        };
    };

    let absolute = tick.price - previous_close;
    let percent = absolute / previous_close * 100.0;

    let direction = if absolute > 0.0 {
        Direction::Up
    } else if absolute < 0.0 {
        Direction::Down
    } else {
        Direction::Flat
    };

    DerivedQuote {
        symbol: tick.symbol.clone(),
        price: tick.price,
        event_timestamp: tick.event_timestamp,
        previous_close: Some(previous_close),
        absolute_change: round_for_display(absolute),
        percent_change: round_for_display(percent),
        direction,
    }
}

/// Round half away from zero on the exact binary value, to two places.
fn round_for_display(value: f64) -> Option<f64> {
    let rounded = Decimal::from_f64_retain(value)?
        .round_dp_with_strategy(DISPLAY_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()?;
    // Normalize -0.0
    Some(rounded + 0.0)
}

// =============================================================================
// Feed Events
// =============================================================================

/// Connection state of the upstream feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Open and resynced.
    Connected,
    /// Sending a normal close during shutdown.
    Closing,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Disconnected | Self::Reconnecting, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Reconnecting)
                | (
                    Self::Connected,
                    Self::Closing | Self::Reconnecting | Self::Disconnected
                )
                | (
                    Self::Connecting | Self::Closing | Self::Reconnecting,
                    Self::Disconnected
                )
        )
    }

    /// Lowercase name for logs and health output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Events emitted by the upstream feed connection.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Connected and resynced.
    Connected {
        /// Number of symbols resubscribed.
        resubscribed: usize,
    },
    /// Connection lost or closed.
    Disconnected,
    /// Waiting to reconnect.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// A validated trade tick.
    Tick(PriceTick),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;
    use crate::domain::reference::InstrumentType;

    fn tick(price: f64) -> PriceTick {
        PriceTick {
            symbol: Symbol::parse("AAPL").unwrap(),
            price,
            event_timestamp: 1_700_000_000_000,
        }
    }

    fn reference(previous_close: f64) -> ReferenceEntry {
        ReferenceEntry {
            symbol: Symbol::parse("AAPL").unwrap(),
            previous_close,
            as_of: Utc::now(),
            display_symbol: "AAPL".to_string(),
            instrument_type: InstrumentType::Stock,
        }
    }

    #[test]
    fn enrich_up_move() {
        let quote = enrich(&tick(101.0), Some(&reference(100.0)));

        assert_eq!(quote.previous_close, Some(100.0));
        assert_eq!(quote.absolute_change, Some(1.0));
        assert_eq!(quote.percent_change, Some(1.0));
        assert_eq!(quote.direction, Direction::Up);
    }

    #[test]
    fn enrich_without_reference() {
        let quote = enrich(&tick(101.0), None);

        assert_eq!(quote.previous_close, None);
        assert_eq!(quote.absolute_change, None);
        assert_eq!(quote.percent_change, None);
        assert_eq!(quote.direction, Direction::Unknown);
        assert_eq!(quote.price, 101.0);
    }

    #[test]
    fn enrich_flat() {
        let quote = enrich(&tick(100.0), Some(&reference(100.0)));

        assert_eq!(quote.direction, Direction::Flat);
        assert_eq!(quote.absolute_change, Some(0.0));
        assert_eq!(quote.percent_change, Some(0.0));
    }

    #[test]
    fn enrich_down_move() {
        let quote = enrich(&tick(95.5), Some(&reference(100.0)));

        assert_eq!(quote.direction, Direction::Down);
        assert_eq!(quote.absolute_change, Some(-4.5));
        assert_eq!(quote.percent_change, Some(-4.5));
    }

    #[test]
    fn enrich_tiny_drop_keeps_direction_but_rounds_to_zero() {
        let quote = enrich(&tick(99.999), Some(&reference(100.0)));

        assert_eq!(quote.direction, Direction::Down);
        assert_eq!(quote.absolute_change, Some(0.0));
        // Never serialized as -0.0
        assert!(quote.absolute_change.unwrap().is_sign_positive());
    }

    #[test]
    fn enrich_rounds_after_computing() {
        // 1.006 / 3 * 100 = 33.5333..; rounding 1.006 first would give 33.67
        let quote = enrich(&tick(4.006), Some(&reference(3.0)));

        assert_eq!(quote.absolute_change, Some(1.01));
        assert_eq!(quote.percent_change, Some(33.53));
    }

    #[test_case(0.0 ; "zero")]
    #[test_case(-5.0 ; "negative")]
    #[test_case(f64::NAN ; "nan")]
    fn enrich_ignores_unusable_reference(previous_close: f64) {
        let quote = enrich(&tick(10.0), Some(&reference(previous_close)));
        assert_eq!(quote.direction, Direction::Unknown);
        assert_eq!(quote.previous_close, None);
    }

    #[test]
    fn derived_quote_wire_format() {
        let quote = enrich(&tick(101.0), Some(&reference(100.0)));
        let json = serde_json::to_value(&quote).unwrap();

        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["eventTimestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["previousClose"], 100.0);
        assert_eq!(json["absoluteChange"], 1.0);
        assert_eq!(json["percentChange"], 1.0);
        assert_eq!(json["direction"], "up");
    }

    #[test]
    fn unknown_quote_serializes_nulls() {
        let json = serde_json::to_value(enrich(&tick(1.0), None)).unwrap();

        assert!(json["previousClose"].is_null());
        assert!(json["absoluteChange"].is_null());
        assert!(json["percentChange"].is_null());
        assert_eq!(json["direction"], "unknown");
    }

    #[test]
    fn connection_state_transitions() {
        use ConnectionState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Connected.can_transition_to(Closing));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Closing.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connected));
        assert!(!Closing.can_transition_to(Connecting));
    }

    proptest! {
        #[test]
        fn direction_matches_sign(price in 0.01f64..10_000.0, pc in 0.01f64..10_000.0) {
            let quote = enrich(&tick(price), Some(&reference(pc)));
            let expected = if price > pc {
                Direction::Up
            } else if price < pc {
                Direction::Down
            } else {
                Direction::Flat
            };
            prop_assert_eq!(quote.direction, expected);
            prop_assert!(quote.absolute_change.is_some());
            prop_assert!(quote.percent_change.is_some());
        }

        #[test]
        fn rounded_change_within_half_cent(price in 0.01f64..10_000.0, pc in 0.01f64..10_000.0) {
            let quote = enrich(&tick(price), Some(&reference(pc)));
            let exact = price - pc;
            let rounded = quote.absolute_change.unwrap();
            prop_assert!((rounded - exact).abs() <= 0.005 + 1e-9);
        }
    }
}
