//! Quote Relay Binary
//!
//! Starts the trade feed relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `FINNHUB_API_KEY`: Finnhub API key
//!
//! ## Optional
//! - `QUOTE_RELAY_PORT`: HTTP port for control API, stream and health (default: 4000)
//! - `QUOTE_RELAY_FEED_URL`: Trade stream URL (default: wss://ws.finnhub.io)
//! - `QUOTE_RELAY_REST_URL`: REST base URL (default: <https://finnhub.io/api/v1>)
//! - `QUOTE_RELAY_SUBSCRIPTIONS_FILE`: Subscription set file (default: subscriptions.json)
//! - `QUOTE_RELAY_REFERENCE_FILE`: Reference cache file (default: referencePrices.json)
//! - `QUOTE_RELAY_FETCH_AT`: Daily forced reference run, UTC `HH:MM` (default: 17:00)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use quote_relay::application::ports::{
    PersistentStore, QuotePublisher, ReferenceSource, UpstreamControl,
};
use quote_relay::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
use quote_relay::infrastructure::finnhub::{FeedClient, FeedClientConfig, FinnhubReferenceSource};
use quote_relay::infrastructure::http::{ApiServer, AppState};
use quote_relay::infrastructure::persistence::JsonFileStore;
use quote_relay::infrastructure::telemetry;
use quote_relay::{
    BatchReferenceFetcher, ControlService, FeedEvent, QuotePipeline, ReferencePriceStore,
    ReferenceSnapshot, RelayConfig, SubscriptionRegistry, SymbolSet, init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Capacity of the feed -> pipeline event channel.
const FEED_EVENT_CAPACITY: usize = 4096;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init()?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting quote relay");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Persisted state
    let subscription_store: Arc<JsonFileStore<SymbolSet>> =
        Arc::new(JsonFileStore::new(&config.storage.subscriptions_file));
    let reference_file: Arc<JsonFileStore<ReferenceSnapshot>> =
        Arc::new(JsonFileStore::new(&config.storage.reference_file));

    let registry = Arc::new(SubscriptionRegistry::new(
        Arc::clone(&subscription_store) as Arc<dyn PersistentStore<SymbolSet>>
    ));
    match registry.load_from_store().await {
        Ok(count) => tracing::info!(symbols = count, "Loaded subscriptions"),
        Err(e) => tracing::error!(error = %e, "Failed to load subscriptions, starting empty"),
    }

    // Reference prices
    let references = Arc::new(ReferencePriceStore::new());
    let source = FinnhubReferenceSource::new(&config.finnhub.rest_url, config.finnhub.api_key.clone())?;
    let fetcher = Arc::new(BatchReferenceFetcher::new(
        Arc::clone(&registry),
        Arc::clone(&references),
        Arc::new(source) as Arc<dyn ReferenceSource>,
        Arc::clone(&reference_file) as Arc<dyn PersistentStore<ReferenceSnapshot>>,
        config.fetch.clone(),
    ));
    match fetcher.load_from_store().await {
        Ok(count) => tracing::info!(entries = count, "Loaded reference prices"),
        Err(e) => tracing::error!(error = %e, "Failed to load reference prices, starting empty"),
    }

    let watcher = reference_file.spawn_watcher(config.storage.reload_poll, shutdown_token.clone());

    let follow_fetcher = Arc::clone(&fetcher);
    let follow_shutdown = shutdown_token.clone();
    let follow = tokio::spawn(async move {
        follow_fetcher.follow_external_changes(follow_shutdown).await;
    });

    let schedule_fetcher = Arc::clone(&fetcher);
    let schedule_shutdown = shutdown_token.clone();
    let scheduled = tokio::spawn(async move {
        schedule_fetcher.run_scheduled(schedule_shutdown).await;
    });

    // Fan-out
    let broadcast_hub = Arc::new(BroadcastHub::new(BroadcastConfig {
        capacity: config.server.broadcast_capacity,
    }));

    // Upstream feed
    let (event_tx, event_rx) = mpsc::channel::<FeedEvent>(FEED_EVENT_CAPACITY);
    let feed_config = FeedClientConfig {
        reconnect: config.feed.reconnect.clone(),
        heartbeat: config.feed.heartbeat.clone(),
        ..FeedClientConfig::new(&config.finnhub.feed_url, config.finnhub.api_key.clone())
    };
    let feed_client = Arc::new(FeedClient::new(
        feed_config,
        Arc::clone(&registry),
        event_tx,
        shutdown_token.clone(),
    ));
    let feed_status = feed_client.status();

    let pipeline = QuotePipeline::new(
        Arc::clone(&registry),
        Arc::clone(&references),
        Arc::clone(&broadcast_hub) as Arc<dyn QuotePublisher>,
    );
    let pipeline_shutdown = shutdown_token.clone();
    let pipeline_task = tokio::spawn(async move {
        pipeline.run(event_rx, pipeline_shutdown).await;
    });

    let feed_task = tokio::spawn(Arc::clone(&feed_client).run());

    // Control API and HTTP server
    let control = Arc::new(
        ControlService::new(
            Arc::clone(&registry),
            Arc::clone(&feed_client) as Arc<dyn UpstreamControl>,
            Arc::clone(&broadcast_hub) as Arc<dyn QuotePublisher>,
        )
        .with_fetch_trigger(fetcher.trigger()),
    );

    let app_state = Arc::new(AppState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        control,
        Arc::clone(&broadcast_hub),
        feed_status,
        Arc::clone(&references),
        shutdown_token.clone(),
    ));
    let api_server = ApiServer::new(config.server.port, app_state, shutdown_token.clone());
    let server_shutdown = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
            server_shutdown.cancel();
        }
    });

    tracing::info!("Quote relay ready");

    await_shutdown(shutdown_token).await;

    let tasks = [feed_task, pipeline_task, server_task, scheduled, follow, watcher];
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, join_all(tasks)).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out, exiting"
        );
    }

    tracing::info!("Quote relay stopped");
    Ok(())
}

async fn join_all<const N: usize>(tasks: [JoinHandle<()>; N]) {
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Task failed during shutdown");
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        port = config.server.port,
        feed_url = %config.finnhub.feed_url,
        rest_url = %config.finnhub.rest_url,
        subscriptions_file = %config.storage.subscriptions_file.display(),
        reference_file = %config.storage.reference_file.display(),
        fetch_at = %config.fetch.daily_at,
        "Configuration loaded"
    );
    tracing::debug!(?config, "Full configuration");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT), or for another task to
/// cancel the token.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::warn!("Shutdown requested internally");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
