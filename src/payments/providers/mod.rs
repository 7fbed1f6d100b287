//! Payment provider implementations

pub mod midtrans;
pub mod stripe;
pub mod xendit;

pub use midtrans::{MidtransConfig, MidtransProvider};
pub use stripe::{StripeConfig, StripeProvider};
pub use xendit::{XenditConfig, XenditProvider};

use crate::error::{AppError, AppResult};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{error, warn};

pub(crate) fn http_client(provider: &str, timeout_secs: u64) -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| {
            error!("Failed to create HTTP client for {}: {}", provider, e);
            AppError::internal(format!("HTTP client for {}: {}", provider, e))
        })
}

/// Sends a status lookup and decodes the JSON body.
///
/// 404 maps to `NotFound`; transport failures, timeouts and any other non-2xx map to
/// `ProviderUnavailable`.
pub(crate) async fn fetch_status<T: DeserializeOwned>(
    provider: &str,
    reference: &str,
    request: reqwest::RequestBuilder,
) -> AppResult<T> {
    let response = request.send().await.map_err(|e| {
        warn!("{} status request failed for {}: {}", provider, reference, e);
        AppError::provider_unavailable(provider, e.to_string())
    })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::not_found("Transaction", reference));
    }
    if !status.is_success() {
        warn!("{} status API returned HTTP {} for {}", provider, status, reference);
        return Err(AppError::provider_unavailable(
            provider,
            format!("HTTP {}", status),
        ));
    }

    response.json::<T>().await.map_err(|e| {
        error!("Failed to parse {} status response: {}", provider, e);
        AppError::provider_unavailable(provider, format!("Invalid response format: {}", e))
    })
}

/// Parses a webhook body as a JSON object.
pub(crate) fn parse_json_body(body: &[u8]) -> AppResult<serde_json::Value> {
    if body.is_empty() {
        return Err(AppError::malformed("empty payload"));
    }
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::malformed(format!("invalid JSON payload: {}", e)))?;
    if !value.is_object() {
        return Err(AppError::malformed("payload must be a JSON object"));
    }
    Ok(value)
}

/// Non-empty string field of a JSON object.
pub(crate) fn string_field<'a>(value: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}
