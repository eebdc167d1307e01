//! Port Interfaces
//!
//! Contracts between the relay's services and the outside world. Services
//! depend only on these traits; adapters in `infrastructure` implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`PersistentStore`]: load/save of a whole value (subscription set, reference cache)
//! - [`ReferenceSource`]: previous-close lookup for one symbol
//! - [`QuotePublisher`]: fan-out of derived quotes to sessions
//! - [`UpstreamControl`]: symbol-level subscribe/unsubscribe on the upstream feed

mod publisher;
mod reference_source;
mod store;
mod upstream;

pub use publisher::{NoOpQuotePublisher, QuotePublisher};
#[cfg(test)]
pub use reference_source::MockReferenceSource;
pub use reference_source::{ReferenceSource, ReferenceSourceError};
pub use store::{PersistentStore, StoreError};
pub use upstream::{NoOpUpstreamControl, UpstreamControl};
