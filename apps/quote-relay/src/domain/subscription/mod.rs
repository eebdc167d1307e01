//! Subscription Domain Types
//!
//! Symbols and copy-on-write helpers for the desired symbol set.
//!
//! # Design
//!
//! A [`Symbol`] can only be constructed through [`Symbol::parse`], which trims
//! and uppercases its input. Every map in the relay is keyed by `Symbol`, so
//! `aapl`, ` AAPL ` and `AAPL` always collapse onto the same entry.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// Ticker symbol (stock ticker or `EXCHANGE:PAIR` crypto symbol).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

/// Errors produced when parsing a symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// Input was empty after trimming.
    #[error("symbol is required")]
    Empty,
    /// Input contained whitespace or control characters.
    #[error("symbol contains invalid characters: {0:?}")]
    InvalidCharacters(String),
}

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::Empty`] for blank input and
    /// [`SymbolError::InvalidCharacters`] if the trimmed input still contains
    /// whitespace or control characters.
    pub fn parse(raw: &str) -> Result<Self, SymbolError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(SymbolError::InvalidCharacters(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Borrow the normalized symbol text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a crypto pair in `EXCHANGE:PAIR` form.
    #[must_use]
    pub fn is_crypto_pair(&self) -> bool {
        self.0.contains(':')
    }

    /// The part after the exchange prefix for crypto pairs, or the whole
    /// symbol otherwise.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, pair)| pair)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Symbol {
    type Error = SymbolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

// =============================================================================
// Symbol Set
// =============================================================================

/// Ordered set of unique symbols.
pub type SymbolSet = BTreeSet<Symbol>;

/// Return a copy of `set` with `symbol` inserted, or `None` if already present.
#[must_use]
pub fn with_symbol(set: &SymbolSet, symbol: &Symbol) -> Option<SymbolSet> {
    if set.contains(symbol) {
        return None;
    }
    let mut next = set.clone();
    next.insert(symbol.clone());
    Some(next)
}

/// Return a copy of `set` with `symbol` removed, or `None` if it was absent.
#[must_use]
pub fn without_symbol(set: &SymbolSet, symbol: &Symbol) -> Option<SymbolSet> {
    if !set.contains(symbol) {
        return None;
    }
    let mut next = set.clone();
    next.remove(symbol);
    Some(next)
}

// =============================================================================
// Tests
// =============================================================================
