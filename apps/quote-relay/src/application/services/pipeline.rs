//! Tick Pipeline
//!
//! Single consumer of upstream [`FeedEvent`]s. Each tick is enriched with
//! the current reference entry and handed to the publisher. Running one
//! consumer keeps ticks for a symbol in upstream order.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::metrics;
use crate::application::ports::QuotePublisher;
use crate::application::services::registry::SubscriptionRegistry;
use crate::domain::reference::ReferencePriceStore;
use crate::domain::streaming::{DerivedQuote, FeedEvent, PriceTick, enrich};

/// Enrich-and-publish stage between the feed and the broadcast hub.
pub struct QuotePipeline {
    registry: Arc<SubscriptionRegistry>,
    references: Arc<ReferencePriceStore>,
    publisher: Arc<dyn QuotePublisher>,
}

impl QuotePipeline {
    /// Create a pipeline.
    #[must_use]
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        references: Arc<ReferencePriceStore>,
        publisher: Arc<dyn QuotePublisher>,
    ) -> Self {
        Self {
            registry,
            references,
            publisher,
        }
    }

    /// Enrich and publish one tick.
    ///
    /// Ticks for symbols no longer in the registry (in flight across an
    /// unsubscribe) are dropped so they do not reappear in snapshots.
    pub fn handle_tick(&self, tick: &PriceTick) -> Option<DerivedQuote> {
        if !self.registry.contains(&tick.symbol) {
            tracing::trace!(symbol = %tick.symbol, "Dropping tick for unsubscribed symbol");
            return None;
        }

        let reference = self.references.get(&tick.symbol);
        let quote = enrich(tick, reference.as_deref());
        self.publisher.publish(quote.clone());
        metrics::record_quote_published();
        Some(quote)
    }

    /// Consume events until the channel closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) {
        tracing::info!("Quote pipeline started");

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match event {
                FeedEvent::Tick(tick) => {
                    let started = Instant::now();
                    metrics::record_tick_received();
                    self.handle_tick(&tick);
                    metrics::record_tick_processing(started.elapsed());
                }
                FeedEvent::Connected { resubscribed } => {
                    tracing::info!(resubscribed, "Upstream feed connected");
                }
                FeedEvent::Disconnected => {
                    tracing::warn!("Upstream feed disconnected");
                }
                FeedEvent::Reconnecting { attempt } => {
                    tracing::info!(attempt, "Upstream feed reconnecting");
                }
            }
        }

        tracing::info!("Quote pipeline stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
