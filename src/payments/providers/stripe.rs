//! Stripe payment provider implementation
//!
//! Webhooks are signed with HMAC-SHA256 over `"{timestamp}.{body}"` and delivered in
//! the `stripe-signature` header as `t=<unix>,v1=<hex>[,v1=<hex>...]`.

use super::{fetch_status, http_client, parse_json_body, string_field};
use crate::error::{AppError, AppResult};
use crate::models::{is_valid_reference, Transaction, TransactionStatus};
use crate::payments::signature::{constant_time_eq, hmac_sha256_hex};
use crate::payments::traits::{
    CreatedPayment, PaymentProvider, WebhookNotification, WebhookVerification,
};
use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

pub const PROVIDER_NAME: &str = "stripe";

pub const MAX_REFERENCE_LEN: usize = 50;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Signing secret of the webhook endpoint. Empty rejects every delivery.
    pub webhook_secret: String,
    pub api_base_url: String,
    pub checkout_base_url: String,
    /// Accepted clock skew between the signature timestamp and now
    pub tolerance_secs: i64,
    pub timeout_secs: u64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            webhook_secret: String::new(),
            api_base_url: "https://api.stripe.com".to_string(),
            checkout_base_url: "https://checkout.stripe.com".to_string(),
            tolerance_secs: 300,
            timeout_secs: 30,
        }
    }
}

pub struct StripeProvider {
    config: StripeConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    status: String,
}

/// Parsed `stripe-signature` header.
struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_signature_header(value: &str) -> Option<SignatureHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for item in value.split(',') {
        match item.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }
    Some(SignatureHeader {
        timestamp: timestamp?,
        signatures,
    })
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> AppResult<Self> {
        let client = http_client(PROVIDER_NAME, config.timeout_secs)?;
        Ok(Self { config, client })
    }

    fn signature_matches(&self, header: &SignatureHeader<'_>, body: &[u8]) -> bool {
        let mut signed = format!("{}.", header.timestamp).into_bytes();
        signed.extend_from_slice(body);
        let expected = hmac_sha256_hex(self.config.webhook_secret.as_bytes(), &signed);

        // Every candidate is compared so the scan length does not depend on which one matches.
        header.signatures.iter().fold(false, |found, candidate| {
            constant_time_eq(expected.as_bytes(), candidate.as_bytes()) | found
        })
    }

    fn map_event_type(event_type: &str) -> Option<TransactionStatus> {
        match event_type {
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                Some(TransactionStatus::Paid)
            }
            "checkout.session.expired" => Some(TransactionStatus::Expired),
            "checkout.session.async_payment_failed" | "payment_intent.payment_failed" => {
                Some(TransactionStatus::Failed)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
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
        if !is_valid_reference(&tx.provider_tx_id, MAX_REFERENCE_LEN) {
            return Err(AppError::invalid_argument("invalid client reference format"));
        }

        info!(
            "Creating Stripe checkout session: client_reference_id={}, amount={}, currency={}",
            tx.provider_tx_id, tx.amount, tx.currency
        );

        let session_id = format!("cs_{}", tx.provider_tx_id);
        let checkout_url = format!("{}/c/pay/{}", self.config.checkout_base_url, session_id);

        Ok(CreatedPayment {
            provider_tx_id: session_id,
            checkout_url,
        })
    }

    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> AppResult<WebhookVerification> {
        let payload = parse_json_body(body)?;
        let event_id = string_field(&payload, "id").unwrap_or_default().to_string();

        if self.config.webhook_secret.is_empty() {
            warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not configured");
            return Ok(WebhookVerification {
                event_id,
                valid: false,
            });
        }

        let header = match headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_signature_header)
        {
            Some(header) => header,
            None => {
                warn!("Missing or unparsable Stripe signature header");
                return Ok(WebhookVerification {
                    event_id,
                    valid: false,
                });
            }
        };

        let matches = self.signature_matches(&header, body);
        let tolerance = u64::try_from(self.config.tolerance_secs).unwrap_or(0);
        let fresh = Utc::now().timestamp().abs_diff(header.timestamp) <= tolerance;
        let valid = matches && fresh;

        if valid {
            info!("Stripe webhook signature verified: event_id={}", event_id);
        } else if matches {
            warn!("Stripe webhook timestamp outside tolerance: event_id={}", event_id);
        } else {
            warn!("Invalid Stripe webhook signature: event_id={}", event_id);
        }

        Ok(WebhookVerification { event_id, valid })
    }

    async fn get_transaction_status(&self, provider_tx_id: &str) -> AppResult<String> {
        if provider_tx_id.is_empty() {
            return Err(AppError::invalid_argument(
                "provider transaction ID is required",
            ));
        }

        info!("Getting Stripe checkout session status: {}", provider_tx_id);

        let url = format!(
            "{}/v1/checkout/sessions/{}",
            self.config.api_base_url, provider_tx_id
        );
        let request = self.client.get(&url).bearer_auth(&self.config.secret_key);

        let response: SessionResponse = fetch_status(PROVIDER_NAME, provider_tx_id, request).await?;
        Ok(response.status)
    }

    fn parse_notification(&self, event_id: &str, body: &[u8]) -> AppResult<WebhookNotification> {
        let payload = parse_json_body(body)?;
        let event_type = string_field(&payload, "type").unwrap_or("");

        let object = payload
            .get("data")
            .and_then(|d| d.get("object"))
            .ok_or_else(|| AppError::malformed("missing data.object"))?;
        let reference = string_field(object, "client_reference_id")
            .or_else(|| object.get("metadata").and_then(|m| string_field(m, "order_id")))
            .ok_or_else(|| AppError::malformed("missing client_reference_id"))?;

        let event_id = match string_field(&payload, "id") {
            Some(id) => id.to_string(),
            None if !event_id.is_empty() => event_id.to_string(),
            None => return Err(AppError::malformed("missing event id")),
        };

        Ok(WebhookNotification {
            event_id,
            provider_tx_id: reference.to_string(),
            status: Self::map_event_type(event_type),
        })
    }
}
