//! Quote Publisher Port (Driven Port)

use crate::domain::streaming::DerivedQuote;
use crate::domain::subscription::Symbol;

/// Port for fanning quotes out to downstream sessions.
pub trait QuotePublisher: Send + Sync {
    /// Record `quote` as the latest for its symbol and push it to every session.
    fn publish(&self, quote: DerivedQuote);

    /// Forget the latest quote for `symbol`.
    fn evict(&self, symbol: &Symbol);
}

/// Publisher that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpQuotePublisher;

impl QuotePublisher for NoOpQuotePublisher {
    fn publish(&self, _quote: DerivedQuote) {}

    fn evict(&self, _symbol: &Symbol) {}
}
