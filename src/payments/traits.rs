//! Payment provider trait definitions
//!
//! Defines the capability set every provider adapter exposes to the gateway.

use crate::error::AppResult;
use crate::models::{Transaction, TransactionStatus};
use async_trait::async_trait;
use axum::http::HeaderMap;

/// Provider-side references returned by `create_payment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub provider_tx_id: String,
    /// Absolute HTTPS URL of the hosted checkout page.
    pub checkout_url: String,
}

/// Outcome of webhook authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookVerification {
    /// Stable delivery id; empty when it cannot be derived deterministically.
    pub event_id: String,
    pub valid: bool,
}

/// What a verified webhook asks the gateway to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookNotification {
    /// Canonical idempotency key for the event.
    pub event_id: String,
    /// Reference the merchant's transaction is stored under.
    pub provider_tx_id: String,
    /// Target status, or `None` when the event carries no state change.
    pub status: Option<TransactionStatus>,
}

/// Trait for payment provider adapters
///
/// Adapters are immutable once built and shared across request tasks and the
/// worker, hence `Send + Sync`.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Registry key, e.g. `"midtrans"`.
    fn name(&self) -> &'static str;

    /// Create a payment for a PENDING transaction
    ///
    /// # Arguments
    /// * `tx` - Transaction with a positive amount, a valid `provider_tx_id` and a currency
    ///
    /// # Returns
    /// * `CreatedPayment` - Non-empty provider reference and HTTPS checkout URL
    ///
    /// Fails with `InvalidArgument` on bad input and `ProviderUnavailable` when the
    /// provider cannot be reached.
    async fn create_payment(&self, tx: &Transaction) -> AppResult<CreatedPayment>;

    /// Authenticate a webhook delivery
    ///
    /// Side-effect free. The secret-dependent comparison runs in constant time.
    ///
    /// # Arguments
    /// * `headers` - Request headers as received
    /// * `body` - Raw request body
    ///
    /// # Returns
    /// * `WebhookVerification` - `valid=false` for a forged or missing signature;
    ///   `Err(MalformedPayload)` when the body cannot be interpreted
    fn verify_webhook(&self, headers: &HeaderMap, body: &[u8]) -> AppResult<WebhookVerification>;

    /// Fetch the provider's view of a payment
    ///
    /// # Returns
    /// * `String` - Provider-native status, e.g. `"settlement"` or `"PAID"`
    ///
    /// Fails with `NotFound` or `ProviderUnavailable`.
    async fn get_transaction_status(&self, provider_tx_id: &str) -> AppResult<String>;

    /// Interpret a verified webhook body
    ///
    /// `event_id` is the id produced by `verify_webhook` for the same delivery.
    fn parse_notification(&self, event_id: &str, body: &[u8]) -> AppResult<WebhookNotification>;
}
