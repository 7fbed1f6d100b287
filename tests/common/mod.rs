#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use paylink::api::{self, AppState};
use paylink::config::ProvidersConfig;
use paylink::database::InMemoryStore;
use paylink::metrics::Metrics;
use paylink::payments::providers::MidtransConfig;
use paylink::payments::signature::sha512_hex;
use paylink::payments::ProviderRegistry;
use paylink::queue::{Enqueuer, MemoryBroker};

pub const SERVER_KEY: &str = "SB-Mid-server-integration";
pub const XENDIT_TOKEN: &str = "xnd-callback-token";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryStore>,
    pub broker: Arc<MemoryBroker>,
    pub metrics: Arc<Metrics>,
    pub registry: ProviderRegistry,
}

pub fn providers_config() -> ProvidersConfig {
    let mut config = ProvidersConfig::default();
    config.midtrans = MidtransConfig::new(SERVER_KEY.to_string(), false);
    config.xendit.webhook_token = XENDIT_TOKEN.to_string();
    config
}

pub fn test_app(require_merchant_auth: bool) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let registry = ProviderRegistry::from_config(&providers_config()).unwrap();

    let state = AppState {
        registry: registry.clone(),
        transactions: store.clone(),
        merchants: store.clone(),
        enqueuer: Enqueuer::new(broker.clone()),
        metrics: metrics.clone(),
        require_merchant_auth,
    };

    TestApp {
        router: api::router(state),
        store,
        broker,
        metrics,
        registry,
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

pub async fn send_json(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(router, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn checkout_body(order_id: &str, provider: &str) -> Value {
    json!({
        "merchant_id": "m1",
        "amount": 50000,
        "currency": "IDR",
        "order_id": order_id,
        "provider_preference": provider,
    })
}

/// Midtrans notification signed with `SERVER_KEY`.
pub fn midtrans_notification(order_id: &str, transaction_id: &str, transaction_status: &str) -> Value {
    let status_code = "200";
    let gross_amount = "50000.00";
    let signature = sha512_hex(&[
        order_id.as_bytes(),
        status_code.as_bytes(),
        gross_amount.as_bytes(),
        SERVER_KEY.as_bytes(),
    ]);
    json!({
        "order_id": order_id,
        "status_code": status_code,
        "gross_amount": gross_amount,
        "signature_key": signature,
        "transaction_id": transaction_id,
        "transaction_status": transaction_status,
    })
}

/// Polls `condition` every 10ms until it holds or `limit` passes.
pub async fn wait_for<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
