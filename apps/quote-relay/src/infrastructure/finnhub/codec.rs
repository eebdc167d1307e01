//! Finnhub Stream Codec
//!
//! Decodes inbound frames into validated [`PriceTick`]s and encodes control
//! frames. Validation fails closed: a trade entry with a missing or blank
//! symbol, a non-finite or non-positive price, or a missing or non-positive
//! timestamp is dropped and counted, and the rest of the batch survives.

use crate::domain::streaming::PriceTick;
use crate::domain::subscription::Symbol;
use crate::infrastructure::finnhub::messages::{ControlFrame, InboundEnvelope, RawTrade};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Valid ticks from a `trade` frame, plus how many entries were dropped.
    Trades {
        /// Ticks in upstream order.
        ticks: Vec<PriceTick>,
        /// Entries that failed validation.
        dropped: usize,
    },
    /// Server keepalive.
    Ping,
    /// Server-reported error.
    Error(String),
    /// Any other frame type.
    Other(String),
}

/// JSON codec for the Finnhub trade stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct FinnhubCodec;

impl FinnhubCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object with a `type`.
    pub fn decode(&self, text: &str) -> Result<Inbound, CodecError> {
        let envelope: InboundEnvelope = serde_json::from_str(text)?;

        Ok(match envelope.kind.as_str() {
            "trade" => {
                let entries = envelope.data.unwrap_or_default();
                let total = entries.len();
                let ticks: Vec<PriceTick> = entries.into_iter().filter_map(validate_trade).collect();
                Inbound::Trades {
                    dropped: total - ticks.len(),
                    ticks,
                }
            }
            "ping" => Inbound::Ping,
            "error" => Inbound::Error(envelope.msg.unwrap_or_default()),
            other => Inbound::Other(other.to_string()),
        })
    }

    /// Encode a control frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &ControlFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }
}

fn validate_trade(value: serde_json::Value) -> Option<PriceTick> {
    let raw: RawTrade = serde_json::from_value(value).ok()?;

    let symbol = Symbol::parse(raw.s?.as_str()?).ok()?;
    let price = raw.p?.as_f64().filter(|p| p.is_finite() && *p > 0.0)?;
    let event_timestamp = raw.t?.as_i64().filter(|t| *t > 0)?;

    Some(PriceTick {
        symbol,
        price,
        event_timestamp,
    })
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn decode(text: &str) -> Inbound {
        FinnhubCodec::new().decode(text).unwrap()
    }

    #[test]
    fn decodes_trade_batch_in_order() {
        let inbound = decode(
            r#"{"type":"trade","data":[
                {"s":"AAPL","p":189.5,"t":1700000000001,"v":10},
                {"s":"MSFT","p":370,"t":1700000000002,"v":5,"c":["1"]},
                {"s":"AAPL","p":189.6,"t":1700000000003}
            ]}"#,
        );

        let Inbound::Trades { ticks, dropped } = inbound else {
            panic!("expected trades");
        };
        assert_eq!(dropped, 0);
        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].symbol.as_str(), "AAPL");
        assert_eq!(ticks[1].price, 370.0);
        assert_eq!(ticks[2].event_timestamp, 1_700_000_000_003);
    }

    #[test_case(r#"{"p":1.0,"t":1}"# ; "missing symbol")]
    #[test_case(r#"{"s":"","p":1.0,"t":1}"# ; "blank symbol")]
    #[test_case(r#"{"s":7,"p":1.0,"t":1}"# ; "numeric symbol")]
    #[test_case(r#"{"s":"AAPL","t":1}"# ; "missing price")]
    #[test_case(r#"{"s":"AAPL","p":0,"t":1}"# ; "zero price")]
    #[test_case(r#"{"s":"AAPL","p":-3.5,"t":1}"# ; "negative price")]
    #[test_case(r#"{"s":"AAPL","p":"12.0","t":1}"# ; "string price")]
    #[test_case(r#"{"s":"AAPL","p":1.0}"# ; "missing timestamp")]
    #[test_case(r#"{"s":"AAPL","p":1.0,"t":0}"# ; "zero timestamp")]
    #[test_case(r#"{"s":"AAPL","p":1.0,"t":"soon"}"# ; "string timestamp")]
    #[test_case(r#""garbage""# ; "not an object")]
    fn drops_invalid_entry(entry: &str) {
        let text = format!(
            r#"{{"type":"trade","data":[{entry},{{"s":"OK","p":2.0,"t":5}}]}}"#
        );

        let Inbound::Trades { ticks, dropped } = decode(&text) else {
            panic!("expected trades");
        };
        assert_eq!(dropped, 1);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].symbol.as_str(), "OK");
    }

    #[test]
    fn trade_without_data_is_empty() {
        assert_eq!(
            decode(r#"{"type":"trade"}"#),
            Inbound::Trades {
                ticks: vec![],
                dropped: 0
            }
        );
    }

    #[test]
    fn lowercase_symbol_is_normalized() {
        let Inbound::Trades { ticks, .. } =
            decode(r#"{"type":"trade","data":[{"s":"binance:btcusdt","p":1.0,"t":1}]}"#)
        else {
            panic!("expected trades");
        };
        assert_eq!(ticks[0].symbol.as_str(), "BINANCE:BTCUSDT");
    }

    #[test]
    fn control_and_unknown_frames() {
        assert_eq!(decode(r#"{"type":"ping"}"#), Inbound::Ping);
        assert_eq!(
            decode(r#"{"type":"error","msg":"Invalid symbol"}"#),
            Inbound::Error("Invalid symbol".into())
        );
        assert_eq!(decode(r#"{"type":"news"}"#), Inbound::Other("news".into()));
    }

    #[test]
    fn non_object_frame_is_error() {
        let codec = FinnhubCodec::new();
        assert!(codec.decode("not json").is_err());
        assert!(codec.decode(r#"{"data":[]}"#).is_err());
        assert!(codec.decode("[]").is_err());
    }

    #[test]
    fn encode_subscribe() {
        let codec = FinnhubCodec::new();
        let text = codec.encode(&ControlFrame::subscribe("TSLA")).unwrap();
        assert_eq!(text, r#"{"type":"subscribe","symbol":"TSLA"}"#);
    }
}
