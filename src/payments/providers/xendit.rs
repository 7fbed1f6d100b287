//! Xendit payment provider implementation
//!
//! Webhooks carry a shared callback token in the `x-callback-token` header.

use super::{fetch_status, http_client, parse_json_body, string_field};
use crate::error::{AppError, AppResult};
use crate::models::{is_valid_reference, Transaction, TransactionStatus};
use crate::payments::signature::{constant_time_eq, sha256_hex};
use crate::payments::traits::{
    CreatedPayment, PaymentProvider, WebhookNotification, WebhookVerification,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

pub const PROVIDER_NAME: &str = "xendit";

/// Longest external id Xendit accepts.
pub const MAX_EXTERNAL_ID_LEN: usize = 64;

pub const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";
pub const WEBHOOK_ID_HEADER: &str = "webhook-id";

#[derive(Debug, Clone)]
pub struct XenditConfig {
    pub api_key: String,
    /// Expected callback token. Empty disables the check.
    pub webhook_token: String,
    pub checkout_base_url: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Default for XenditConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            webhook_token: String::new(),
            checkout_base_url: "https://checkout-staging.xendit.co".to_string(),
            api_base_url: "https://api.xendit.co".to_string(),
            timeout_secs: 30,
        }
    }
}

pub struct XenditProvider {
    config: XenditConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct InvoiceResponse {
    status: String,
}

impl XenditProvider {
    pub fn new(config: XenditConfig) -> AppResult<Self> {
        let client = http_client(PROVIDER_NAME, config.timeout_secs)?;
        Ok(Self { config, client })
    }

    /// Delivery id header, else the first 8 bytes of SHA-256 over the body in hex.
    fn derive_event_id(headers: &HeaderMap, body: &[u8]) -> String {
        match headers
            .get(WEBHOOK_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            Some(id) => id.to_string(),
            None => sha256_hex(body)[..16].to_string(),
        }
    }

    fn map_status(status: &str) -> Option<TransactionStatus> {
        match status {
            "PAID" | "SETTLED" => Some(TransactionStatus::Paid),
            "PENDING" => Some(TransactionStatus::Pending),
            "EXPIRED" => Some(TransactionStatus::Expired),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

#[async_trait]
impl PaymentProvider for XenditProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn create_payment(&self, tx: &Transaction) -> AppResult<CreatedPayment> {
        if tx.amount <= 0 {
            return Err(AppError::invalid_argument("amount must be positive"));
        }
        if tx.currency.is_empty() {
            return Err(AppError::invalid_argument("currency is required"));
        }
        if !is_valid_reference(&tx.provider_tx_id, MAX_EXTERNAL_ID_LEN) {
            return Err(AppError::invalid_argument("invalid external ID format"));
        }

        info!(
            "Creating Xendit invoice: external_id={}, amount={}, currency={}",
            tx.provider_tx_id, tx.amount, tx.currency
        );

        let invoice_id = format!("xnd_inv_{}", tx.provider_tx_id);
        let checkout_url = format!("{}/web/{}", self.config.checkout_base_url, invoice_id);

        info!("Xendit invoice created: invoice_id={}", invoice_id);

        Ok(CreatedPayment {
            provider_tx_id: invoice_id,
            checkout_url,
        })
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> AppResult<WebhookVerification> {
        parse_json_body(body)?;

        let event_id = Self::derive_event_id(headers, body);

        if self.config.webhook_token.is_empty() {
            return Ok(WebhookVerification {
                event_id,
                valid: true,
            });
        }

        let token = headers
            .get(CALLBACK_TOKEN_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        let valid = constant_time_eq(token, self.config.webhook_token.as_bytes());

        if valid {
            info!("Xendit webhook verified: event_id={}", event_id);
        } else {
            warn!("Invalid Xendit callback token: event_id={}", event_id);
        }

        Ok(WebhookVerification { event_id, valid })
    }

    async fn get_transaction_status(&self, provider_tx_id: &str) -> AppResult<String> {
        if provider_tx_id.is_empty() {
            return Err(AppError::invalid_argument(
                "provider transaction ID is required",
            ));
        }

        info!("Getting Xendit invoice status: {}", provider_tx_id);

        let url = format!("{}/v2/invoices/{}", self.config.api_base_url, provider_tx_id);
        let request = self
            .client
            .get(&url)
            .basic_auth(&self.config.api_key, Some(""));

        let response: InvoiceResponse = fetch_status(PROVIDER_NAME, provider_tx_id, request).await?;
        Ok(response.status)
    }

    fn parse_notification(&self, event_id: &str, body: &[u8]) -> AppResult<WebhookNotification> {
        let payload = parse_json_body(body)?;
        let external_id = string_field(&payload, "external_id")
            .ok_or_else(|| AppError::malformed("missing required field external_id"))?;
        let status = string_field(&payload, "status").unwrap_or("");

        let event_id = if event_id.is_empty() {
            sha256_hex(body)[..16].to_string()
        } else {
            event_id.to_string()
        };

        Ok(WebhookNotification {
            event_id,
            provider_tx_id: external_id.to_string(),
            status: Self::map_status(status),
        })
    }
}
