//! Domain Layer - Core relay types and pure business logic.
//!
//! Nothing in here performs I/O. Types carry serde derives so adapters can
//! put them on the wire or on disk directly.

/// Previous-close reference entries and the shared store.
pub mod reference;

/// Ticks, derived quotes and the enrichment function.
pub mod streaming;

/// Symbols and the desired symbol set.
pub mod subscription;
