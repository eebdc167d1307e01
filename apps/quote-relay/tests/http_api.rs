//! HTTP Surface Integration Tests
//!
//! Drives the router in-process for the control API and health endpoints,
//! and over a real socket for the session stream.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use quote_relay::application::ports::{NoOpUpstreamControl, QuotePublisher};
use quote_relay::infrastructure::http::{ErrorResponse, SubscriptionResponse, SubscriptionsResponse};
use quote_relay::infrastructure::persistence::InMemoryStore;
use quote_relay::{
    ApiServer, AppState, BroadcastHub, ControlService, FeedStatus, InstrumentType, PriceTick,
    QuotePipeline, ReferenceEntry, ReferencePriceStore, SubscriptionRegistry, Symbol, SymbolSet,
    router,
};

const STEP: Duration = Duration::from_secs(5);

struct Fixture {
    state: Arc<AppState>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<InMemoryStore<SymbolSet>>,
    hub: Arc<BroadcastHub>,
    references: Arc<ReferencePriceStore>,
    cancel: CancellationToken,
}

fn fixture() -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(SubscriptionRegistry::new(store.clone()));
    let hub = Arc::new(BroadcastHub::with_defaults());
    let references = Arc::new(ReferencePriceStore::new());
    let cancel = CancellationToken::new();
    let control = Arc::new(ControlService::new(
        Arc::clone(&registry),
        Arc::new(NoOpUpstreamControl),
        Arc::clone(&hub) as Arc<dyn QuotePublisher>,
    ));
    let state = Arc::new(AppState::new(
        "test".to_string(),
        control,
        Arc::clone(&hub),
        Arc::new(FeedStatus::default()),
        Arc::clone(&references),
        cancel.clone(),
    ));

    Fixture {
        state,
        registry,
        store,
        hub,
        references,
        cancel,
    }
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn call(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router(Arc::clone(state)).oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

#[tokio::test]
async fn subscribe_normalizes_persists_and_lists() {
    let f = fixture();

    let (status, body) = call(&f.state, post_json("/subscribe", r#"{"symbol":" aapl "}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let response: SubscriptionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.message, "Subscription for AAPL added");
    assert_eq!(response.active_subscriptions, vec![sym("AAPL")]);

    // Idempotent
    let (status, body) = call(&f.state, post_json("/subscribe", r#"{"symbol":"AAPL"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let response: SubscriptionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.active_subscriptions, vec![sym("AAPL")]);
    assert_eq!(f.store.save_count(), 1);

    call(&f.state, post_json("/subscribe", r#"{"symbol":"msft"}"#)).await;
    let (status, body) = call(&f.state, get("/subscriptions")).await;
    assert_eq!(status, StatusCode::OK);
    let listed: SubscriptionsResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed.active_subscriptions, vec![sym("AAPL"), sym("MSFT")]);
    assert_eq!(f.store.value().unwrap().len(), 2);

    let raw: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(raw, serde_json::json!({"activeSubscriptions": ["AAPL", "MSFT"]}));
}

#[tokio::test]
async fn unsubscribe_removes_symbol() {
    let f = fixture();
    f.registry.add(&sym("TSLA")).await;

    let (status, body) = call(&f.state, post_json("/unsubscribe", r#"{"symbol":"tsla"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let response: SubscriptionResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.message, "Subscription for TSLA removed");
    assert!(response.active_subscriptions.is_empty());
    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn missing_symbol_is_client_error() {
    let f = fixture();

    for (uri, body) in [
        ("/subscribe", "{}"),
        ("/subscribe", r#"{"symbol":"   "}"#),
        ("/unsubscribe", "{}"),
        ("/subscribe", "not json"),
    ] {
        let (status, bytes) = call(&f.state, post_json(uri, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {body}");
        let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(error.error, "Symbol is required");
    }

    // Missing body entirely
    let request = Request::builder()
        .method("POST")
        .uri("/subscribe")
        .body(Body::empty())
        .unwrap();
    let (status, _) = call(&f.state, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(f.registry.is_empty());
}

#[tokio::test]
async fn malformed_symbol_is_client_error() {
    let f = fixture();
    let (status, bytes) = call(&f.state, post_json("/subscribe", r#"{"symbol":"AA PL"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
    assert!(error.error.contains("AA PL"), "{}", error.error);
}

#[tokio::test]
async fn health_endpoints_reflect_upstream() {
    let f = fixture();
    f.registry.add(&sym("AAPL")).await;

    let (status, body) = call(&f.state, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    // Upstream never connected in this fixture
    let (status, _) = call(&f.state, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = call(&f.state, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["upstream"]["state"], "disconnected");
    assert_eq!(health["subscriptions"], serde_json::json!(["AAPL"]));
    assert_eq!(health["sessions"], 0);
    assert_eq!(health["version"], "test");
}

#[tokio::test]
async fn stream_sends_snapshot_then_live_quotes() {
    let f = fixture();
    f.registry.add(&sym("AAPL")).await;
    f.references.upsert(ReferenceEntry {
        symbol: sym("AAPL"),
        previous_close: 100.0,
        as_of: Utc::now(),
        display_symbol: "AAPL".to_string(),
        instrument_type: InstrumentType::Stock,
    });
    let pipeline = QuotePipeline::new(
        Arc::clone(&f.registry),
        Arc::clone(&f.references),
        Arc::clone(&f.hub) as Arc<dyn QuotePublisher>,
    );
    pipeline.handle_tick(&PriceTick {
        symbol: sym("AAPL"),
        price: 100.0,
        event_timestamp: 1,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(ApiServer::new(0, Arc::clone(&f.state), f.cancel.clone()).serve(listener));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/stream"))
        .await
        .unwrap();

    let initial = next_json(&mut ws).await;
    assert_eq!(initial["event"], "initialData");
    let snapshot = initial["data"].as_array().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0]["direction"], "flat");
    assert_eq!(snapshot[0]["absoluteChange"], 0.0);
    assert_eq!(f.hub.stats().sessions, 1);

    pipeline.handle_tick(&PriceTick {
        symbol: sym("AAPL"),
        price: 101.0,
        event_timestamp: 2,
    });

    let live = next_json(&mut ws).await;
    assert_eq!(live["event"], "stockData");
    assert_eq!(live["data"]["symbol"], "AAPL");
    assert_eq!(live["data"]["eventTimestamp"], 2);
    assert_eq!(live["data"]["previousClose"], 100.0);
    assert_eq!(live["data"]["absoluteChange"], 1.0);
    assert_eq!(live["data"]["percentChange"], 1.0);
    assert_eq!(live["data"]["direction"], "up");

    ws.close(None).await.unwrap();
    timeout(STEP, async {
        while f.hub.stats().sessions > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    f.cancel.cancel();
    timeout(STEP, server).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn unsubscribed_symbol_leaves_new_snapshots() {
    let f = fixture();
    f.registry.add(&sym("AAPL")).await;
    let pipeline = QuotePipeline::new(
        Arc::clone(&f.registry),
        Arc::clone(&f.references),
        Arc::clone(&f.hub) as Arc<dyn QuotePublisher>,
    );
    pipeline.handle_tick(&PriceTick {
        symbol: sym("AAPL"),
        price: 5.0,
        event_timestamp: 1,
    });
    assert_eq!(f.hub.connect().snapshot.len(), 1);

    call(&f.state, post_json("/unsubscribe", r#"{"symbol":"AAPL"}"#)).await;

    assert!(f.hub.connect().snapshot.is_empty());
    // A tick still in flight for the removed symbol is dropped
    assert!(
        pipeline
            .handle_tick(&PriceTick {
                symbol: sym("AAPL"),
                price: 6.0,
                event_timestamp: 2,
            })
            .is_none()
    );
}

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = timeout(STEP, ws.next()).await.unwrap().unwrap().unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}
