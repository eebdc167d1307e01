//! Reference Prices
//!
//! Previous-close entries per symbol and the in-memory store the tick path
//! reads from.
//!
//! # Design
//!
//! The store holds an immutable map behind an [`ArcSwap`]. Readers on the
//! tick path take a snapshot without locking; writers build a new map and
//! swap it in. A reader therefore sees either the old or the new entry for a
//! symbol, never a partially written one.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::subscription::Symbol;

// =============================================================================
// Entries
// =============================================================================

/// Kind of instrument an entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    /// Listed equity.
    #[default]
    Stock,
    /// Crypto pair (`EXCHANGE:PAIR`).
    Crypto,
}

impl InstrumentType {
    /// Infer the instrument type from the symbol shape.
    #[must_use]
    pub fn of(symbol: &Symbol) -> Self {
        if symbol.is_crypto_pair() {
            Self::Crypto
        } else {
            Self::Stock
        }
    }
}

/// Previous-close reference for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    /// Symbol this entry belongs to.
    pub symbol: Symbol,
    /// Previous session close (positive).
    pub previous_close: f64,
    /// When the value was observed at the source.
    pub as_of: DateTime<Utc>,
    /// Human-facing symbol or company name.
    #[serde(default)]
    pub display_symbol: String,
    /// Instrument kind.
    #[serde(default)]
    pub instrument_type: InstrumentType,
}

impl ReferenceEntry {
    /// Whether the entry is still fresh at `now`.
    ///
    /// Without a TTL an entry never goes stale.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Option<Duration>) -> bool {
        ttl.is_none_or(|ttl| now.signed_duration_since(self.as_of) < ttl)
    }
}

/// Serialized reference file: entries sorted by symbol.
pub type ReferenceSnapshot = Vec<ReferenceEntry>;

// =============================================================================
// Store
// =============================================================================

/// Shared, lock-free readable map of reference entries.
#[derive(Debug, Default)]
pub struct ReferencePriceStore {
    entries: ArcSwap<HashMap<Symbol, Arc<ReferenceEntry>>>,
}

impl ReferencePriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: ReferenceSnapshot) -> Self {
        let store = Self::new();
        store.replace_all(snapshot);
        store
    }

    /// Look up the current entry for `symbol`.
    #[must_use]
    pub fn get(&self, symbol: &Symbol) -> Option<Arc<ReferenceEntry>> {
        self.entries.load().get(symbol).cloned()
    }

    /// Insert or replace a single entry.
    pub fn upsert(&self, entry: ReferenceEntry) {
        let entry = Arc::new(entry);
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(entry.symbol.clone(), Arc::clone(&entry));
            next
        });
    }

    /// Replace every entry at once. Later duplicates win.
    pub fn replace_all(&self, snapshot: ReferenceSnapshot) {
        let next = snapshot
            .into_iter()
            .map(|entry| (entry.symbol.clone(), Arc::new(entry)))
            .collect();
        self.entries.store(Arc::new(next));
    }

    /// Owned copy of all entries sorted by symbol, suitable for persisting.
    #[must_use]
    pub fn snapshot(&self) -> ReferenceSnapshot {
        let mut entries: ReferenceSnapshot = self
            .entries
            .load()
            .values()
            .map(|entry| ReferenceEntry::clone(entry))
            .collect();
        entries.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
