//! Finnhub WebSocket Message Types
//!
//! Wire format types for the Finnhub trade stream.
//!
//! # Outbound
//! - `{"type":"subscribe","symbol":"AAPL"}`
//! - `{"type":"unsubscribe","symbol":"AAPL"}`
//!
//! # Inbound
//! - `trade`: batch of trades, `{"type":"trade","data":[{"s","p","t","v","c"}]}`
//! - `ping`: keepalive from the server
//! - `error`: `{"type":"error","msg":"..."}`
//!
//! # References
//!
//! - [Trades - Last Price Updates](https://finnhub.io/docs/api/websocket-trades)

use serde::{Deserialize, Serialize};

// =============================================================================
// Outbound
// =============================================================================

/// Subscription action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start receiving trades for a symbol.
    Subscribe,
    /// Stop receiving trades for a symbol.
    Unsubscribe,
}

/// Subscribe/unsubscribe frame sent to the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Action to perform.
    #[serde(rename = "type")]
    pub action: ControlAction,

    /// Symbol the action applies to.
    pub symbol: String,
}

impl ControlFrame {
    /// Subscribe frame for `symbol`.
    #[must_use]
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            symbol: symbol.into(),
        }
    }

    /// Unsubscribe frame for `symbol`.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            symbol: symbol.into(),
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// Envelope common to every inbound frame.
///
/// Only `type` is required; the payload fields are optional so that
/// unexpected shapes surface as validation drops instead of decode errors.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundEnvelope {
    /// Frame type (`trade`, `ping`, `error`, ...).
    #[serde(rename = "type")]
    pub kind: String,

    /// Trade entries (for `trade`).
    #[serde(default)]
    pub data: Option<Vec<serde_json::Value>>,

    /// Error message (for `error`).
    #[serde(default)]
    pub msg: Option<String>,
}

/// One trade as sent by Finnhub.
///
/// ```json
/// {"s": "AAPL", "p": 189.32, "t": 1700000000123, "v": 100, "c": ["1"]}
/// ```
///
/// Fields are loosely typed here; [`FinnhubCodec`](super::codec::FinnhubCodec)
/// validates them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTrade {
    /// Symbol.
    #[serde(default)]
    pub s: Option<serde_json::Value>,

    /// Last price.
    #[serde(default)]
    pub p: Option<serde_json::Value>,

    /// Epoch milliseconds.
    #[serde(default)]
    pub t: Option<serde_json::Value>,
}
