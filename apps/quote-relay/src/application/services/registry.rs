//! Subscription Registry
//!
//! Durable set of symbols the relay wants from the upstream feed. This is
//! the authoritative desired state; the upstream connection resyncs from it
//! on every connect.
//!
//! # Concurrency
//!
//! Reads (`list`, `contains`) load the current set through an [`ArcSwap`]
//! and never wait. Mutations are serialized by an async mutex that is held
//! across the persist, so two concurrent `add`/`remove` calls can never
//! interleave their writes.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::application::metrics::{self, PersistTarget};
use crate::application::ports::{PersistentStore, StoreError};
use crate::domain::subscription::{Symbol, SymbolSet, with_symbol, without_symbol};

/// Registry error.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backing store failed.
    #[error("subscription store error: {0}")]
    Store(#[from] StoreError),
}

/// Durable, deduplicated set of subscribed symbols.
pub struct SubscriptionRegistry {
    current: ArcSwap<SymbolSet>,
    write: Mutex<()>,
    store: Arc<dyn PersistentStore<SymbolSet>>,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("symbols", &self.current.load().len())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore<SymbolSet>>) -> Self {
        Self {
            current: ArcSwap::from_pointee(SymbolSet::new()),
            write: Mutex::new(()),
            store,
        }
    }

    /// Replace the in-memory set with the persisted one.
    ///
    /// A store with nothing in it leaves the registry empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or decoded; the
    /// in-memory set is left unchanged.
    pub async fn load_from_store(&self) -> Result<usize, RegistryError> {
        let _guard = self.write.lock().await;
        let loaded = self.store.load().await?.unwrap_or_default();
        let count = loaded.len();
        self.current.store(Arc::new(loaded));
        metrics::set_subscriptions(count);
        Ok(count)
    }

    /// Write the current set to the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub async fn persist(&self) -> Result<(), RegistryError> {
        let _guard = self.write.lock().await;
        let snapshot = self.current.load_full();
        self.store.save(&snapshot).await?;
        Ok(())
    }

    /// Add `symbol`. Returns `true` if it was not already present.
    ///
    /// The new set is persisted before this returns. A failed persist is
    /// logged; the in-memory set keeps the symbol.
    pub async fn add(&self, symbol: &Symbol) -> bool {
        let _guard = self.write.lock().await;
        let Some(next) = with_symbol(&self.current.load(), symbol) else {
            return false;
        };
        self.commit(next).await;
        tracing::info!(symbol = %symbol, "Subscription added");
        true
    }

    /// Remove `symbol`. Returns `true` if it was present.
    ///
    /// The new set is persisted before this returns. A failed persist is
    /// logged; the in-memory set no longer has the symbol.
    pub async fn remove(&self, symbol: &Symbol) -> bool {
        let _guard = self.write.lock().await;
        let Some(next) = without_symbol(&self.current.load(), symbol) else {
            return false;
        };
        self.commit(next).await;
        tracing::info!(symbol = %symbol, "Subscription removed");
        true
    }

    /// Current set of symbols.
    #[must_use]
    pub fn list(&self) -> Arc<SymbolSet> {
        self.current.load_full()
    }

    /// Whether `symbol` is subscribed.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.current.load().contains(symbol)
    }

    /// Number of subscribed symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// Whether no symbols are subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Swap in `next` and persist it. Caller holds the write lock.
    async fn commit(&self, next: SymbolSet) {
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        metrics::set_subscriptions(next.len());

        if let Err(e) = self.store.save(&next).await {
            metrics::record_persist_failure(PersistTarget::Subscriptions);
            tracing::error!(error = %e, "Failed to persist subscriptions");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::InMemoryStore;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn registry() -> (SubscriptionRegistry, Arc<InMemoryStore<SymbolSet>>) {
        let store = Arc::new(InMemoryStore::new());
        (SubscriptionRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let (registry, store) = registry();

        assert!(registry.add(&sym("AAPL")).await);
        assert!(!registry.add(&sym("AAPL")).await);

        assert_eq!(registry.len(), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn remove_absent_is_noop() {
        let (registry, store) = registry();

        assert!(!registry.remove(&sym("AAPL")).await);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn every_mutation_persists_before_returning() {
        let (registry, store) = registry();

        registry.add(&sym("AAPL")).await;
        registry.add(&sym("MSFT")).await;
        assert_eq!(
            store.value().unwrap(),
            [sym("AAPL"), sym("MSFT")].into_iter().collect()
        );

        registry.remove(&sym("AAPL")).await;
        assert_eq!(store.value().unwrap(), [sym("MSFT")].into_iter().collect());
        assert_eq!(store.save_count(), 3);
    }

    #[tokio::test]
    async fn load_from_store_replaces_state() {
        let persisted: SymbolSet = [sym("TSLA"), sym("NVDA")].into_iter().collect();
        let store = Arc::new(InMemoryStore::with_value(persisted));
        let registry = SubscriptionRegistry::new(store);

        assert_eq!(registry.load_from_store().await.unwrap(), 2);
        assert!(registry.contains(&sym("TSLA")));
        assert!(registry.contains(&sym("NVDA")));
    }

    #[tokio::test]
    async fn load_from_empty_store() {
        let (registry, _store) = registry();
        assert_eq!(registry.load_from_store().await.unwrap(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn persist_failure_keeps_memory_state() {
        let (registry, store) = registry();
        store.set_fail_saves(true);

        assert!(registry.add(&sym("AAPL")).await);
        assert!(registry.contains(&sym("AAPL")));
        assert!(store.value().is_none());

        assert!(registry.persist().await.is_err());

        store.set_fail_saves(false);
        registry.persist().await.unwrap();
        assert_eq!(store.value().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_adds_all_land() {
        let (registry, store) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.add(&sym(&format!("S{i}"))).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        assert_eq!(registry.len(), 20);
        assert_eq!(store.value().unwrap().len(), 20);
        assert_eq!(store.save_count(), 20);
    }

    #[tokio::test]
    async fn list_snapshot_is_stable() {
        let (registry, _store) = registry();
        registry.add(&sym("AAPL")).await;

        let before = registry.list();
        registry.add(&sym("MSFT")).await;

        assert_eq!(before.len(), 1);
        assert_eq!(registry.list().len(), 2);
    }
}
