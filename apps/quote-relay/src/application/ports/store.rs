//! Persistent Store Port (Driven Port)
//!
//! Whole-value persistence. Every save replaces the previous value
//! atomically; there are no partial or incremental writes.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing storage failed.
    #[error("store I/O error at {path}: {source}")]
    Io {
        /// Location of the backing storage.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Stored contents could not be encoded or decoded.
    #[error("store serialization error at {path}: {source}")]
    Serialization {
        /// Location of the backing storage.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Port for loading and saving one value as a whole.
#[async_trait]
pub trait PersistentStore<T>: Send + Sync
where
    T: Send + Sync,
{
    /// Load the stored value, or `None` if nothing has been stored yet.
    async fn load(&self) -> Result<Option<T>, StoreError>;

    /// Replace the stored value.
    async fn save(&self, value: &T) -> Result<(), StoreError>;

    /// Change notifications for writes made by someone else.
    ///
    /// The counter increments on every external change. Backends that
    /// cannot observe external writers return `None`.
    fn watch(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}
