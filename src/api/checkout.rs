use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::database::hash_api_key;
use crate::error::{AppError, AppErrorKind, AppResult};
use crate::models::{CheckoutRequest, CheckoutResponse, Transaction};

pub const API_KEY_HEADER: &str = "x-api-key";

/// `POST /v1/checkout`
///
/// Every validation rule runs before anything is stored or sent to a provider.
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> AppResult<Json<CheckoutResponse>> {
    let Json(req) = payload.map_err(|e| {
        debug!("Failed to decode checkout request: {}", e);
        AppError::invalid_argument("Invalid request body")
    })?;

    req.validate().map_err(|e| {
        warn!("Checkout validation failed: {}", e);
        e
    })?;

    let adapter = state.registry.resolve(&req.provider_preference).map_err(|e| {
        warn!("Checkout for unavailable provider: {}", e);
        AppError::invalid_argument("Provider unavailable")
    })?;

    if state.require_merchant_auth {
        authenticate_merchant(&state, &headers, &req.merchant_id).await?;
    }

    let tx = Transaction::new_pending(
        &req.merchant_id,
        adapter.name(),
        &req.order_id,
        req.amount,
        &req.currency,
    );

    state.transactions.insert(&tx).await.map_err(|e| {
        if e.is_unique_violation() {
            AppError::invalid_argument("order_id already used for this provider")
        } else {
            AppError::from(e).with_context("insert transaction")
        }
    })?;

    let created = adapter.create_payment(&tx).await.map_err(|e| {
        error!(
            "Failed to create payment: provider={}, order_id={}, error={}",
            adapter.name(),
            tx.provider_tx_id,
            e
        );
        AppError::provider_unavailable(adapter.name(), e.to_string())
    })?;

    if let Err(e) = state
        .transactions
        .attach_checkout(&tx.id, &created.provider_tx_id, &created.checkout_url)
        .await
    {
        warn!("Failed to store checkout reference for {}: {}", tx.id, e);
    }

    state.metrics.record_checkout(adapter.name());

    info!(
        "Checkout created: provider={}, order_id={}, amount={}",
        adapter.name(),
        req.order_id,
        req.amount
    );

    Ok(Json(CheckoutResponse {
        checkout_url: created.checkout_url,
        provider_tx_id: created.provider_tx_id,
    }))
}

/// The key must belong to the merchant named in the request.
async fn authenticate_merchant(
    state: &AppState,
    headers: &HeaderMap,
    merchant_id: &str,
) -> AppResult<()> {
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::new(AppErrorKind::Unauthorized))?;

    let owner = state
        .merchants
        .lookup_by_api_key(&hash_api_key(api_key))
        .await?;

    match owner {
        Some(owner) if owner == merchant_id => Ok(()),
        _ => {
            warn!("Merchant authentication failed for {}", merchant_id);
            Err(AppError::new(AppErrorKind::Unauthorized))
        }
    }
}
