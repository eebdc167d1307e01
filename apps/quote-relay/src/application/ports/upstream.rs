//! Upstream Control Port (Driven Port)
//!
//! Symbol-level commands to the single upstream feed connection. Commands
//! are only delivered while connected; otherwise they are dropped and the
//! next connect performs a full resync from the registry.

use crate::domain::subscription::Symbol;

/// Port for steering the upstream subscription set.
pub trait UpstreamControl: Send + Sync {
    /// Send a subscribe command. Returns `true` if it was handed to a live
    /// connection.
    fn subscribe(&self, symbol: &Symbol) -> bool;

    /// Send an unsubscribe command. Returns `true` if it was handed to a
    /// live connection.
    fn unsubscribe(&self, symbol: &Symbol) -> bool;
}

/// Upstream control that never has a live connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpUpstreamControl;

impl UpstreamControl for NoOpUpstreamControl {
    fn subscribe(&self, _symbol: &Symbol) -> bool {
        false
    }

    fn unsubscribe(&self, _symbol: &Symbol) -> bool {
        false
    }
}
