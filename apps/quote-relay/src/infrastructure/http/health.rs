//! Health check and metrics handlers.
//!
//! - `GET /health` - JSON status
//! - `GET /healthz` - liveness (simple OK)
//! - `GET /readyz` - readiness (upstream connected)
//! - `GET /metrics` - Prometheus text format

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::AppState;
use crate::domain::streaming::ConnectionState;
use crate::domain::subscription::Symbol;
use crate::infrastructure::finnhub::FeedStatusSnapshot;
use crate::infrastructure::metrics::get_metrics_handle;

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Upstream connection status.
    pub upstream: FeedStatusSnapshot,
    /// Subscribed symbols.
    pub subscriptions: Vec<Symbol>,
    /// Connected downstream sessions.
    pub sessions: usize,
    /// Cached reference entries.
    pub reference_entries: usize,
    /// Symbols with a latest quote.
    pub cached_quotes: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Upstream connected.
    Healthy,
    /// Upstream connecting or reconnecting; snapshots still served.
    Degraded,
    /// Upstream down and not retrying.
    Unhealthy,
}

impl HealthStatus {
    const fn from_upstream(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => Self::Degraded,
            ConnectionState::Disconnected | ConnectionState::Closing => Self::Unhealthy,
        }
    }
}

pub(super) async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

pub(super) async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.feed.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let upstream = state.feed.snapshot();
    let hub = state.hub.stats();

    HealthResponse {
        status: HealthStatus::from_upstream(upstream.state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        upstream,
        subscriptions: state.control.list(),
        sessions: hub.sessions,
        reference_entries: state.references.len(),
        cached_quotes: hub.cached_quotes,
    }
}
