//! Downstream session stream.
//!
//! Each WebSocket session gets one `initialData` event with the latest
//! quote per symbol, then one `stockData` event per published quote. A
//! session that falls behind the broadcast buffer skips the missed quotes;
//! it never receives one twice.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::AppState;
use crate::domain::streaming::DerivedQuote;

/// Event sent to a downstream session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum StreamEvent<'a> {
    /// Snapshot sent once on connect.
    InitialData(&'a [DerivedQuote]),
    /// One live quote.
    StockData(&'a DerivedQuote),
}

impl StreamEvent<'_> {
    fn to_message(&self) -> Result<Message, serde_json::Error> {
        serde_json::to_string(self).map(|json| Message::Text(json.into()))
    }
}

pub(super) async fn stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_session(socket, state))
}

async fn handle_session(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let session = state.hub.connect();
    let session_id = session.id;
    tracing::info!(session_id = %session_id, snapshot = session.snapshot.len(), "Session opened");

    let initial = StreamEvent::InitialData(&session.snapshot).to_message();
    let opened = match initial {
        Ok(message) => ws_tx.send(message).await.is_ok(),
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "Failed to encode snapshot");
            false
        }
    };

    if opened {
        let mut live = BroadcastStream::new(session.receiver);
        loop {
            tokio::select! {
                () = state.cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
                item = live.next() => match item {
                    Some(Ok(quote)) => {
                        let message = match StreamEvent::StockData(&quote).to_message() {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::error!(symbol = %quote.symbol, error = %e, "Failed to encode quote");
                                continue;
                            }
                        };
                        if ws_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::warn!(session_id = %session_id, skipped, "Session lagged, quotes skipped");
                    }
                    None => break,
                },
                incoming = ws_rx.next() => match incoming {
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    // Sessions are receive-only; anything else is ignored.
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    state.hub.disconnect(session_id);
    tracing::info!(session_id = %session_id, "Session closed");
}
