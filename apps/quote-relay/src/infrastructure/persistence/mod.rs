//! Persistence Adapters
//!
//! Implementations of the [`PersistentStore`](crate::application::ports::PersistentStore)
//! port: an atomic-replace JSON file store with an mtime poller for external
//! changes, and an in-memory store for tests and ephemeral runs.

mod in_memory;
mod json_file;

pub use in_memory::InMemoryStore;
pub use json_file::JsonFileStore;
