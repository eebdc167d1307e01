//! Finnhub Adapters
//!
//! - **Trade stream**: single WebSocket connection with resync, heartbeat
//!   and fixed-delay reconnect (JSON codec)
//! - **REST**: previous close and display metadata for the batch fetcher

pub mod codec;
pub mod feed;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod rest;

pub use codec::{CodecError, FinnhubCodec, Inbound};
pub use feed::{FeedClient, FeedClientConfig, FeedClientError, FeedStatus, FeedStatusSnapshot};
pub use heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
pub use messages::{ControlAction, ControlFrame};
pub use reconnect::{ReconnectConfig, ReconnectGuard, ReconnectPolicy, ReconnectTicket};
pub use rest::FinnhubReferenceSource;
