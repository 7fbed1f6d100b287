use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::AppState;
use crate::error::{AppError, AppErrorKind, AppResult};

/// Largest webhook body accepted.
pub const MAX_WEBHOOK_BODY: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookAccepted {
    pub status: String,
    pub event_id: String,
}

/// `POST /v1/webhook/:provider`
///
/// Replies 200 only once the broker has accepted the job; processing happens later.
pub async fn handle_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> AppResult<Json<WebhookAccepted>> {
    let body = axum::body::to_bytes(body, MAX_WEBHOOK_BODY)
        .await
        .map_err(|e| {
            warn!("Rejected webhook body for {}: {}", provider, e);
            AppError::invalid_argument("Request body too large or unreadable")
        })?;

    if body.is_empty() {
        return Err(AppError::invalid_argument("Empty request body"));
    }

    let adapter = state.registry.resolve(&provider).map_err(|e| {
        warn!("Unknown provider in webhook: {}", provider);
        e
    })?;

    state.metrics.webhook_received();

    let verification = adapter.verify_webhook(&headers, &body).map_err(|e| {
        error!("Webhook verification error: provider={}, error={}", provider, e);
        state.metrics.webhook_failed();
        e
    })?;

    if !verification.valid {
        warn!("Invalid webhook signature: provider={}", provider);
        state.metrics.webhook_failed();
        return Err(AppError::new(AppErrorKind::InvalidSignature));
    }

    // Verified bodies are JSON, which is always UTF-8.
    let payload = String::from_utf8(body.to_vec()).map_err(|_| {
        state.metrics.webhook_failed();
        AppError::malformed("body is not UTF-8")
    })?;

    state
        .enqueuer
        .enqueue_webhook(adapter.name(), &verification.event_id, payload)
        .await
        .map_err(|e| {
            state.metrics.webhook_failed();
            AppError::from(e)
        })?;

    info!(
        "Webhook enqueued: provider={}, event_id={}",
        provider, verification.event_id
    );

    Ok(Json(WebhookAccepted {
        status: "queued".to_string(),
        event_id: verification.event_id,
    }))
}
