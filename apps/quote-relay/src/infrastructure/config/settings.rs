//! Relay Configuration Settings
//!
//! Configuration types for the quote relay, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::application::services::FetchSettings;
use crate::infrastructure::finnhub::{HeartbeatConfig, ReconnectConfig};

/// Finnhub API key.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request URLs.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Upstream endpoints.
#[derive(Debug, Clone)]
pub struct FinnhubSettings {
    /// Trade stream WebSocket URL.
    pub feed_url: String,
    /// REST base URL for quotes and profiles.
    pub rest_url: String,
    /// API key used by both.
    pub api_key: ApiKey,
}

impl FinnhubSettings {
    /// Default trade stream URL.
    pub const DEFAULT_FEED_URL: &'static str = "wss://ws.finnhub.io";
    /// Default REST base URL.
    pub const DEFAULT_REST_URL: &'static str = "https://finnhub.io/api/v1";
}

/// Upstream connection settings.
#[derive(Debug, Clone, Default)]
pub struct FeedSettings {
    /// Fixed reconnect delay.
    pub reconnect: ReconnectConfig,
    /// Ping interval and pong timeout.
    pub heartbeat: HeartbeatConfig,
}

/// Persisted state locations.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Subscription set file.
    pub subscriptions_file: PathBuf,
    /// Reference price cache file.
    pub reference_file: PathBuf,
    /// How often the reference file is checked for outside changes.
    pub reload_poll: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            subscriptions_file: PathBuf::from("subscriptions.json"),
            reference_file: PathBuf::from("referencePrices.json"),
            reload_poll: Duration::from_millis(1000),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for the control API, session stream and health endpoints.
    pub port: u16,
    /// Capacity of the live quote broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 4000,
            broadcast_capacity: 10_000,
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream endpoints and credentials.
    pub finnhub: FinnhubSettings,
    /// Upstream connection settings.
    pub feed: FeedSettings,
    /// Batch reference fetch settings.
    pub fetch: FetchSettings,
    /// Persisted state locations.
    pub storage: StorageSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FINNHUB_API_KEY` is missing or empty, or if
    /// `QUOTE_RELAY_FETCH_AT` is set but not a valid `HH:MM` time.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`RelayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("FINNHUB_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("FINNHUB_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("FINNHUB_API_KEY".to_string()));
        }

        let finnhub = FinnhubSettings {
            feed_url: lookup("QUOTE_RELAY_FEED_URL")
                .unwrap_or_else(|| FinnhubSettings::DEFAULT_FEED_URL.to_string()),
            rest_url: lookup("QUOTE_RELAY_REST_URL")
                .unwrap_or_else(|| FinnhubSettings::DEFAULT_REST_URL.to_string()),
            api_key: ApiKey::new(api_key.trim()),
        };

        let feed_defaults = FeedSettings::default();
        let feed = FeedSettings {
            reconnect: ReconnectConfig {
                delay: parse_period_secs(
                    &lookup,
                    "QUOTE_RELAY_RECONNECT_DELAY_SECS",
                    feed_defaults.reconnect.delay,
                ),
            },
            heartbeat: HeartbeatConfig {
                ping_interval: parse_period_secs(
                    &lookup,
                    "QUOTE_RELAY_HEARTBEAT_INTERVAL_SECS",
                    feed_defaults.heartbeat.ping_interval,
                ),
                pong_timeout: parse_period_secs(
                    &lookup,
                    "QUOTE_RELAY_HEARTBEAT_TIMEOUT_SECS",
                    feed_defaults.heartbeat.pong_timeout,
                ),
            },
        };

        let fetch_defaults = FetchSettings::default();
        let daily_at = match lookup("QUOTE_RELAY_FETCH_AT") {
            Some(raw) => parse_time_of_day(&raw)?,
            None => fetch_defaults.daily_at,
        };
        let fetch = FetchSettings {
            max_attempts: parse_or(&lookup, "QUOTE_RELAY_FETCH_MAX_ATTEMPTS", fetch_defaults.max_attempts)
                .max(1),
            cooldown: parse_duration_secs(&lookup, "QUOTE_RELAY_FETCH_COOLDOWN_SECS", fetch_defaults.cooldown),
            delay: parse_duration_millis(&lookup, "QUOTE_RELAY_FETCH_DELAY_MS", fetch_defaults.delay),
            small_batch_delay: parse_duration_millis(
                &lookup,
                "QUOTE_RELAY_FETCH_DELAY_SMALL_MS",
                fetch_defaults.small_batch_delay,
            ),
            small_batch_threshold: parse_or(
                &lookup,
                "QUOTE_RELAY_FETCH_SMALL_BATCH",
                fetch_defaults.small_batch_threshold,
            ),
            ttl: lookup("QUOTE_RELAY_REFERENCE_TTL_SECS")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|secs| *secs > 0)
                .map(chrono::Duration::seconds),
            daily_at,
        };

        let storage_defaults = StorageSettings::default();
        let storage = StorageSettings {
            subscriptions_file: lookup("QUOTE_RELAY_SUBSCRIPTIONS_FILE")
                .map_or(storage_defaults.subscriptions_file, PathBuf::from),
            reference_file: lookup("QUOTE_RELAY_REFERENCE_FILE")
                .map_or(storage_defaults.reference_file, PathBuf::from),
            reload_poll: parse_period_millis(
                &lookup,
                "QUOTE_RELAY_RELOAD_POLL_MS",
                storage_defaults.reload_poll,
            ),
        };

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            port: parse_or(&lookup, "QUOTE_RELAY_PORT", server_defaults.port),
            broadcast_capacity: parse_or(
                &lookup,
                "QUOTE_RELAY_BROADCAST_CAPACITY",
                server_defaults.broadcast_capacity,
            )
            .max(1),
        };

        Ok(Self {
            finnhub,
            feed,
            fetch,
            storage,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Daily fetch time is not `HH:MM`.
    #[error("invalid QUOTE_RELAY_FETCH_AT {0:?}: expected HH:MM")]
    InvalidFetchTime(String),
}

fn parse_time_of_day(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|_| ConfigError::InvalidFetchTime(raw.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Like `parse_duration_secs`, but zero falls back to the default.
/// Used for timer periods, which must be non-zero.
fn parse_period_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    non_zero_or(parse_duration_secs(lookup, key, default), default)
}

fn parse_period_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    non_zero_or(parse_duration_millis(lookup, key, default), default)
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() { default } else { value }
}
