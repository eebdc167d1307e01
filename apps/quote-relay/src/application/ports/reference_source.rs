//! Reference Source Port (Driven Port)
//!
//! Lookup of the previous close and display metadata for one symbol.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::reference::ReferenceEntry;
use crate::domain::subscription::Symbol;

/// Reference lookup error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferenceSourceError {
    /// The source asked us to slow down (HTTP 429).
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-suggested wait, if any.
        retry_after: Option<Duration>,
    },

    /// The source has no usable data for the symbol.
    #[error("no reference data for {symbol}")]
    NotFound {
        /// Requested symbol.
        symbol: String,
    },

    /// The response could not be interpreted.
    #[error("malformed response: {message}")]
    Malformed {
        /// What was wrong.
        message: String,
    },

    /// Non-success HTTP status other than 429.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Connection, TLS or timeout failure.
    #[error("transport error: {message}")]
    Transport {
        /// Error description.
        message: String,
    },
}

impl ReferenceSourceError {
    /// Whether this is a rate-limit response.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether retrying the same symbol cannot help.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Malformed { .. })
    }
}

/// Port for fetching reference data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceSource: Send + Sync {
    /// Fetch the current reference entry for `symbol`.
    async fn fetch(&self, symbol: &Symbol) -> Result<ReferenceEntry, ReferenceSourceError>;
}
