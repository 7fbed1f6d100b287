//! HTTP surface: merchant checkout, provider webhooks, transaction lookup, health and metrics.

pub mod checkout;
pub mod health;
pub mod metrics;
pub mod transactions;
pub mod webhook;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::database::{MerchantStore, TransactionStore};
use crate::metrics::Metrics;
use crate::payments::ProviderRegistry;
use crate::queue::Enqueuer;

/// Budget for reading a request and writing its response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub registry: ProviderRegistry,
    pub transactions: Arc<dyn TransactionStore>,
    pub merchants: Arc<dyn MerchantStore>,
    pub enqueuer: Enqueuer,
    pub metrics: Arc<Metrics>,
    pub require_merchant_auth: bool,
}

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/checkout", post(checkout::create_checkout))
        .route("/webhook/:provider", post(webhook::handle_webhook))
        .route("/tx/:id", get(transactions::get_transaction))
        .route_layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            metrics::track_requests,
        ));

    Router::new()
        .nest("/v1", v1)
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::render_metrics))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
