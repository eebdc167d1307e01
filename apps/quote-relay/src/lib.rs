#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap,
        clippy::items_after_statements
    )
)]

//! Quote Relay - Trade Feed Multiplexer
//!
//! Maintains a single connection to the Finnhub trade stream for a dynamic
//! set of symbols, enriches every trade with the symbol's previous close,
//! and fans the derived quotes out to many WebSocket sessions. A batch job
//! keeps the previous-close cache fresh under the REST API's rate limits.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Core relay types and pure logic
//!   - `subscription`: Symbols and the desired symbol set
//!   - `streaming`: Ticks, derived quotes, enrichment, connection state
//!   - `reference`: Previous-close entries and the lock-free store
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Persistence, reference source, publisher, upstream control
//!   - `services`: Registry, control, tick pipeline, batch fetcher
//!   - `metrics`: Metric names and recording helpers (facade only)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: Trade stream client and REST reference source
//!   - `broadcast`: Latest-quote cache and session fan-out
//!   - `http`: Control API, session stream, health and metrics
//!   - `persistence`: JSON file and in-memory stores
//!   - `config`: Environment configuration
//!   - `metrics`: Prometheus exporter
//!
//! # Data Flow
//!
//! ```text
//! POST /subscribe -> Registry -> FeedClient --subscribe--> Finnhub WS
//!                                                             |
//!                                          trades             v
//! Session 1 <--+                                        FeedClient
//! Session 2 <--+-- BroadcastHub <-- QuotePipeline <-- (FeedEvent channel)
//! Session N <--+                          ^
//!                                         | previous close
//!               Finnhub REST --> BatchReferenceFetcher --> ReferencePriceStore
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::reference::{InstrumentType, ReferenceEntry, ReferencePriceStore, ReferenceSnapshot};
pub use domain::streaming::{ConnectionState, DerivedQuote, Direction, FeedEvent, PriceTick, enrich};
pub use domain::subscription::{Symbol, SymbolError, SymbolSet};

// Services
pub use application::services::{
    BatchReferenceFetcher, BatchReport, ControlError, ControlService, FetchSettings, FetchTrigger,
    QuotePipeline, SubscriptionChange, SubscriptionRegistry,
};

// Infrastructure config
pub use infrastructure::config::{ApiKey, ConfigError, RelayConfig};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{BroadcastConfig, BroadcastHub, BroadcastStats, Session};

// Upstream feed (for integration tests)
pub use infrastructure::finnhub::{FeedClient, FeedClientConfig, FeedStatus, FinnhubReferenceSource};

// HTTP server
pub use infrastructure::http::{ApiServer, ApiServerError, AppState, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
