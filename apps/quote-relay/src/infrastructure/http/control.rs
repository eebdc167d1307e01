//! Control API handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::application::services::{ControlError, SubscriptionChange};
use crate::domain::subscription::{Symbol, SymbolError};

/// Body of `POST /subscribe` and `POST /unsubscribe`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SymbolRequest {
    /// Symbol to act on; trimmed and uppercased by the relay.
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Successful subscribe/unsubscribe response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    /// Human readable outcome.
    pub message: String,
    /// Registry contents after the call.
    pub active_subscriptions: Vec<Symbol>,
}

/// `GET /subscriptions` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionsResponse {
    /// Registry contents.
    pub active_subscriptions: Vec<Symbol>,
}

/// Client error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What was wrong with the request.
    pub error: String,
}

fn bad_request(error: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Pull the raw symbol out of the body. A missing or unreadable body is
/// treated like a missing symbol.
fn requested_symbol(body: Result<Json<SymbolRequest>, JsonRejection>) -> Result<String, Response> {
    match body {
        Ok(Json(SymbolRequest {
            symbol: Some(symbol),
        })) => Ok(symbol),
        Ok(Json(SymbolRequest { symbol: None })) => Err(bad_request("Symbol is required")),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected control request body");
            Err(bad_request("Symbol is required"))
        }
    }
}

fn change_response(result: Result<SubscriptionChange, ControlError>, verb: &str) -> Response {
    match result {
        Ok(change) => Json(SubscriptionResponse {
            message: format!("Subscription for {} {verb}", change.symbol),
            active_subscriptions: change.active,
        })
        .into_response(),
        Err(ControlError::InvalidSymbol(SymbolError::Empty)) => bad_request("Symbol is required"),
        Err(e) => bad_request(e.to_string()),
    }
}

pub(super) async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SymbolRequest>, JsonRejection>,
) -> Response {
    let raw = match requested_symbol(body) {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    change_response(state.control.subscribe(&raw).await, "added")
}

pub(super) async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SymbolRequest>, JsonRejection>,
) -> Response {
    let raw = match requested_symbol(body) {
        Ok(raw) => raw,
        Err(response) => return response,
    };
    change_response(state.control.unsubscribe(&raw).await, "removed")
}

pub(super) async fn list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(SubscriptionsResponse {
        active_subscriptions: state.control.list(),
    })
}
