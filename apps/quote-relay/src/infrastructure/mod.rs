//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Finnhub trade stream and REST adapters.
pub mod finnhub;

/// Latest-quote cache and session fan-out.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Control API, session stream and health endpoints.
pub mod http;

/// Prometheus exporter.
pub mod metrics;

/// File-backed and in-memory persistent stores.
pub mod persistence;

/// Tracing and OpenTelemetry integration.
pub mod telemetry;
