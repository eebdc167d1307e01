//! Application Services
//!
//! - `SubscriptionRegistry`: durable desired symbol set
//! - `ControlService`: subscribe/unsubscribe/list for clients
//! - `QuotePipeline`: enrich upstream ticks and hand them to the hub
//! - `BatchReferenceFetcher`: scheduled, rate-limited reference refresh

pub mod control;
pub mod fetcher;
pub mod pipeline;
pub mod registry;

pub use control::{ControlError, ControlService, SubscriptionChange};
pub use fetcher::{
    BatchReferenceFetcher, BatchReport, DailySchedule, FetchSettings, FetchTrigger, next_run_after,
};
pub use pipeline::QuotePipeline;
pub use registry::{RegistryError, SubscriptionRegistry};
