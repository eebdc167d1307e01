//! Control Service
//!
//! Client-facing subscribe/unsubscribe/list operations. Validates and
//! normalizes the symbol, updates the registry, then steers the upstream
//! connection. Upstream commands are best effort: if the feed is down the
//! next connect resyncs from the registry anyway.

use std::sync::Arc;

use crate::application::ports::{QuotePublisher, UpstreamControl};
use crate::application::services::fetcher::FetchTrigger;
use crate::application::services::registry::SubscriptionRegistry;
use crate::domain::subscription::{Symbol, SymbolError};

/// Control operation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// Symbol missing or malformed.
    #[error(transparent)]
    InvalidSymbol(#[from] SymbolError),
}

/// Result of a subscribe or unsubscribe call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    /// Normalized symbol the call acted on.
    pub symbol: Symbol,
    /// Whether the registry changed.
    pub changed: bool,
    /// Registry contents after the call.
    pub active: Vec<Symbol>,
}

/// Subscribe/unsubscribe/list operations.
pub struct ControlService {
    registry: Arc<SubscriptionRegistry>,
    upstream: Arc<dyn UpstreamControl>,
    publisher: Arc<dyn QuotePublisher>,
    fetch_trigger: Option<FetchTrigger>,
}

impl std::fmt::Debug for ControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlService")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ControlService {
    /// Create a control service.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        upstream: Arc<dyn UpstreamControl>,
        publisher: Arc<dyn QuotePublisher>,
    ) -> Self {
        Self {
            registry,
            upstream,
            publisher,
            fetch_trigger: None,
        }
    }

    /// Request a reference fill whenever a new symbol is subscribed.
    #[must_use]
    pub fn with_fetch_trigger(mut self, trigger: FetchTrigger) -> Self {
        self.fetch_trigger = Some(trigger);
        self
    }

    /// Subscribe to `raw` (trimmed and uppercased).
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidSymbol`] for a blank or malformed symbol.
    pub async fn subscribe(&self, raw: &str) -> Result<SubscriptionChange, ControlError> {
        let symbol = Symbol::parse(raw)?;
        let changed = self.registry.add(&symbol).await;

        if changed {
            let sent = self.upstream.subscribe(&symbol);
            tracing::debug!(symbol = %symbol, sent, "Upstream subscribe");
            if let Some(trigger) = &self.fetch_trigger {
                trigger.request();
            }
        }

        Ok(self.change(symbol, changed))
    }

    /// Unsubscribe from `raw` (trimmed and uppercased).
    ///
    /// The symbol's latest quote is dropped from the snapshot cache.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidSymbol`] for a blank or malformed symbol.
    pub async fn unsubscribe(&self, raw: &str) -> Result<SubscriptionChange, ControlError> {
        let symbol = Symbol::parse(raw)?;
        let changed = self.registry.remove(&symbol).await;

        if changed {
            let sent = self.upstream.unsubscribe(&symbol);
            tracing::debug!(symbol = %symbol, sent, "Upstream unsubscribe");
            self.publisher.evict(&symbol);
        }

        Ok(self.change(symbol, changed))
    }

    /// Current subscriptions, sorted.
    #[must_use]
    pub fn list(&self) -> Vec<Symbol> {
        self.registry.list().iter().cloned().collect()
    }

    fn change(&self, symbol: Symbol, changed: bool) -> SubscriptionChange {
        SubscriptionChange {
            symbol,
            changed,
            active: self.list(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
