//! Application Layer - Services and port definitions.
//!
//! Services orchestrate domain logic and talk to the outside world only
//! through the traits in [`ports`].

/// Relay metric names and recording helpers.
pub mod metrics;

/// Port interfaces for storage, reference data, fan-out and the upstream feed.
pub mod ports;

/// Registry, control, tick pipeline and reference fetcher services.
pub mod services;
