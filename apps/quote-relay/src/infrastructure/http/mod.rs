//! HTTP Server
//!
//! One axum server for everything downstream-facing.
//!
//! # Endpoints
//!
//! - `POST /subscribe`, `POST /unsubscribe`, `GET /subscriptions` - control API
//! - `GET /stream` - WebSocket session (`initialData` then `stockData` events)
//! - `GET /health`, `GET /healthz`, `GET /readyz`, `GET /metrics`

mod control;
mod health;
mod stream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::ControlService;
use crate::domain::reference::ReferencePriceStore;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::finnhub::FeedStatus;

pub use control::{ErrorResponse, SubscriptionResponse, SubscriptionsResponse, SymbolRequest};
pub use health::{HealthResponse, HealthStatus};
pub use stream::StreamEvent;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by all handlers.
pub struct AppState {
    version: String,
    started_at: Instant,
    control: Arc<ControlService>,
    hub: SharedBroadcastHub,
    feed: Arc<FeedStatus>,
    references: Arc<ReferencePriceStore>,
    cancel: CancellationToken,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub fn new(
        version: String,
        control: Arc<ControlService>,
        hub: SharedBroadcastHub,
        feed: Arc<FeedStatus>,
        references: Arc<ReferencePriceStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            control,
            hub,
            feed,
            references,
            cancel,
        }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/subscribe", post(control::subscribe_handler))
        .route("/unsubscribe", post(control::unsubscribe_handler))
        .route("/subscriptions", get(control::list_handler))
        .route("/stream", get(stream::stream_handler))
        .route("/health", get(health::health_handler))
        .route("/healthz", get(health::liveness_handler))
        .route("/readyz", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// Downstream HTTP server.
pub struct ApiServer {
    port: u16,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind and run until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ApiServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ApiServerError::BindFailed(self.port, e.to_string()))?;

        self.serve(listener).await
    }

    /// Run on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ApiServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ApiServerError> {
        let port = listener.local_addr().map_or(self.port, |a| a.port());
        tracing::info!(port, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ApiServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
