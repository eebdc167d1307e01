//! In-memory store for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{PersistentStore, StoreError};

/// In-memory implementation of `PersistentStore`.
///
/// Suitable for testing and development. Not for production use.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    value: Mutex<Option<T>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            value: Mutex::new(None),
            saves: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> InMemoryStore<T> {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds `value`.
    #[must_use]
    pub fn with_value(value: T) -> Self {
        let store = Self::default();
        *store.value.lock() = Some(value);
        store
    }

    /// Current stored value.
    #[must_use]
    pub fn value(&self) -> Option<T> {
        self.value.lock().clone()
    }

    /// Number of successful saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent saves fail with an I/O error.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl<T> PersistentStore<T> for InMemoryStore<T>
where
    T: Clone + Send + Sync,
{
    async fn load(&self) -> Result<Option<T>, StoreError> {
        Ok(self.value.lock().clone())
    }

    async fn save(&self, value: &T) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io {
                path: "memory".into(),
                source: std::io::Error::other("injected save failure"),
            });
        }
        *self.value.lock() = Some(value.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
