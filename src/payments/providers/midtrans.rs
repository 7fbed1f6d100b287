//! Midtrans payment provider implementation
//!
//! Webhooks are authenticated with
//! `hex(SHA512(order_id ++ status_code ++ gross_amount ++ server_key))` carried in
//! the body's `signature_key` field.

use super::{fetch_status, http_client, parse_json_body, string_field};
use crate::error::{AppError, AppResult};
use crate::models::{is_valid_reference, Transaction, TransactionStatus};
use crate::payments::signature::{constant_time_eq, sha512_hex};
use crate::payments::traits::{
    CreatedPayment, PaymentProvider, WebhookNotification, WebhookVerification,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

pub const PROVIDER_NAME: &str = "midtrans";

/// Longest order id Midtrans accepts.
pub const MAX_ORDER_ID_LEN: usize = 50;

const SANDBOX_APP_URL: &str = "https://app.sandbox.midtrans.com";
const SANDBOX_API_URL: &str = "https://api.sandbox.midtrans.com";
const PRODUCTION_APP_URL: &str = "https://app.midtrans.com";
const PRODUCTION_API_URL: &str = "https://api.midtrans.com";

#[derive(Debug, Clone)]
pub struct MidtransConfig {
    pub server_key: String,
    pub is_production: bool,
    /// Snap host used for hosted checkout redirects
    pub app_base_url: String,
    /// Core API host used for status lookups
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Default for MidtransConfig {
    fn default() -> Self {
        Self {
            server_key: String::new(),
            is_production: false,
            app_base_url: SANDBOX_APP_URL.to_string(),
            api_base_url: SANDBOX_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

impl MidtransConfig {
    pub fn new(server_key: String, is_production: bool) -> Self {
        let (app_base_url, api_base_url) = if is_production {
            (PRODUCTION_APP_URL, PRODUCTION_API_URL)
        } else {
            (SANDBOX_APP_URL, SANDBOX_API_URL)
        };
        Self {
            server_key,
            is_production,
            app_base_url: app_base_url.to_string(),
            api_base_url: api_base_url.to_string(),
            ..Self::default()
        }
    }
}

pub struct MidtransProvider {
    config: MidtransConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    transaction_status: String,
}

impl MidtransProvider {
    pub fn new(config: MidtransConfig) -> AppResult<Self> {
        let client = http_client(PROVIDER_NAME, config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn expected_signature(&self, order_id: &str, status_code: &str, gross_amount: &str) -> String {
        sha512_hex(&[
            order_id.as_bytes(),
            status_code.as_bytes(),
            gross_amount.as_bytes(),
            self.config.server_key.as_bytes(),
        ])
    }

    fn map_status(transaction_status: &str, fraud_status: Option<&str>) -> Option<TransactionStatus> {
        match transaction_status {
            "capture" if fraud_status == Some("challenge") => Some(TransactionStatus::Pending),
            "capture" | "settlement" => Some(TransactionStatus::Paid),
            "pending" => Some(TransactionStatus::Pending),
            "deny" | "cancel" | "failure" => Some(TransactionStatus::Failed),
            "expire" => Some(TransactionStatus::Expired),
            _ => None,
        }
    }
}

#[async_trait]
impl PaymentProvider for MidtransProvider {
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
        if !is_valid_reference(&tx.provider_tx_id, MAX_ORDER_ID_LEN) {
            return Err(AppError::invalid_argument("invalid order ID format"));
        }

        info!(
            "Creating Midtrans payment: order_id={}, amount={}, currency={}",
            tx.provider_tx_id, tx.amount, tx.currency
        );

        let token = format!("snap_{}_{}", tx.provider_tx_id, tx.amount);
        let checkout_url = format!("{}/snap/v3/redirection/{}", self.config.app_base_url, token);

        info!("Midtrans payment created: token={}", token);

        Ok(CreatedPayment {
            provider_tx_id: token,
            checkout_url,
        })
    }

    fn verify_webhook(&self, _headers: &HeaderMap, body: &[u8]) -> AppResult<WebhookVerification> {
        let payload = parse_json_body(body)?;

        let required = [
            "order_id",
            "status_code",
            "gross_amount",
            "signature_key",
            "transaction_id",
        ];
        let mut fields = Vec::with_capacity(required.len());
        for name in required {
            let value = string_field(&payload, name)
                .ok_or_else(|| AppError::malformed(format!("missing required field {}", name)))?;
            fields.push(value);
        }
        let (order_id, status_code, gross_amount, signature_key, transaction_id) =
            (fields[0], fields[1], fields[2], fields[3], fields[4]);

        if !is_valid_reference(order_id, MAX_ORDER_ID_LEN) {
            warn!("Invalid order_id format in Midtrans webhook");
            return Err(AppError::malformed("invalid order_id format"));
        }

        let expected = self.expected_signature(order_id, status_code, gross_amount);
        let valid = constant_time_eq(expected.as_bytes(), signature_key.as_bytes());

        if valid {
            info!(
                "Midtrans webhook signature verified: order_id={}, transaction_id={}",
                order_id, transaction_id
            );
        } else {
            warn!(
                "Invalid signature in Midtrans webhook: order_id={}, expected_prefix={}...",
                order_id,
                &expected[..16]
            );
        }

        Ok(WebhookVerification {
            event_id: transaction_id.to_string(),
            valid,
        })
    }

    async fn get_transaction_status(&self, provider_tx_id: &str) -> AppResult<String> {
        if provider_tx_id.is_empty() {
            return Err(AppError::invalid_argument(
                "provider transaction ID is required",
            ));
        }

        info!("Getting Midtrans transaction status: {}", provider_tx_id);

        let url = format!("{}/v2/{}/status", self.config.api_base_url, provider_tx_id);
        let request = self
            .client
            .get(&url)
            .basic_auth(&self.config.server_key, Some(""))
            .header("Accept", "application/json");

        let response: StatusResponse = fetch_status(PROVIDER_NAME, provider_tx_id, request).await?;
        Ok(response.transaction_status)
    }

    fn parse_notification(&self, event_id: &str, body: &[u8]) -> AppResult<WebhookNotification> {
        let payload = parse_json_body(body)?;
        let order_id = string_field(&payload, "order_id")
            .ok_or_else(|| AppError::malformed("missing required field order_id"))?;
        let transaction_status = string_field(&payload, "transaction_status").unwrap_or("");
        let fraud_status = string_field(&payload, "fraud_status");

        let transaction_id = match string_field(&payload, "transaction_id") {
            Some(id) => id,
            None if !event_id.is_empty() => event_id,
            None => return Err(AppError::malformed("missing required field transaction_id")),
        };

        // One payment produces several notifications under the same transaction_id.
        let event_id = format!("{}:{}", transaction_id, transaction_status);

        Ok(WebhookNotification {
            event_id,
            provider_tx_id: order_id.to_string(),
            status: Self::map_status(transaction_status, fraud_status),
        })
    }
}
