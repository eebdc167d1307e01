//! Configuration Module
//!
//! Configuration loading for the relay.

mod settings;

pub use settings::{
    ApiKey, ConfigError, FeedSettings, FinnhubSettings, RelayConfig, ServerSettings,
    StorageSettings,
};
