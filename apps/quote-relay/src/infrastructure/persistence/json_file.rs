//! JSON File Store
//!
//! Stores one value as a pretty-printed JSON file. Saves write a sibling
//! `.tmp` file, flush it and rename it over the target, so readers (and a
//! crash) only ever see the old or the new contents.
//!
//! [`JsonFileStore::spawn_watcher`] polls the file's modification time and
//! bumps the [`watch`](PersistentStore::watch) counter when another process
//! rewrites it. The store's own saves do not count as changes.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PersistentStore, StoreError};

/// Shortest interval the file watcher polls at.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// File-backed implementation of `PersistentStore`.
#[derive(Debug)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    tmp_path: PathBuf,
    /// Last modification time we know about (own write or observed).
    last_seen: Mutex<Option<SystemTime>>,
    write_lock: tokio::sync::Mutex<()>,
    changes: watch::Sender<u64>,
    _value: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Create a store for `path`. Nothing is read until [`load`](PersistentStore::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        let (changes, _) = watch::channel(0);

        Self {
            path,
            tmp_path,
            last_seen: Mutex::new(None),
            write_lock: tokio::sync::Mutex::new(()),
            changes,
            _value: PhantomData,
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
    }

    /// Check the file once; returns `true` if it changed since last seen.
    async fn poll_once(&self) -> bool {
        // A save in progress will record its own mtime.
        let Ok(_guard) = self.write_lock.try_lock() else {
            return false;
        };
        let Some(modified) = self.modified().await else {
            return false;
        };

        let mut last_seen = self.last_seen.lock();
        if *last_seen == Some(modified) {
            return false;
        }
        *last_seen = Some(modified);
        true
    }
}

impl<T> JsonFileStore<T>
where
    T: Send + Sync + 'static,
{
    /// Poll the file every `interval` until `cancel` fires.
    ///
    /// A zero interval is raised to [`MIN_POLL_INTERVAL`].
    pub fn spawn_watcher(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if store.poll_once().await {
                            tracing::info!(path = %store.path.display(), "Detected external change");
                            store.changes.send_modify(|n| *n = n.wrapping_add(1));
                        }
                    }
                }
            }

            tracing::debug!(path = %store.path.display(), "File watcher stopped");
        })
    }
}

#[async_trait]
impl<T> PersistentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<Option<T>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let modified = self.modified().await;
        let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })?;
        *self.last_seen.lock() = modified;
        Ok(Some(value))
    }

    async fn save(&self, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        let _guard = self.write_lock.lock().await;

        let mut file = tokio::fs::File::create(&self.tmp_path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&bytes).await.map_err(|e| self.io_error(e))?;
        file.sync_all().await.map_err(|e| self.io_error(e))?;
        drop(file);

        tokio::fs::rename(&self.tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let modified = self.modified().await;
        *self.last_seen.lock() = modified;
        Ok(())
    }

    fn watch(&self) -> Option<watch::Receiver<u64>> {
        Some(self.changes.subscribe())
    }
}

// =============================================================================
// Tests
// =============================================================================
