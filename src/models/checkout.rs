use serde::{Deserialize, Serialize};

use super::transaction::{is_valid_reference, MAX_AMOUNT, MAX_REFERENCE_LEN};
use crate::error::{AppError, AppResult};

/// Merchant-facing checkout request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub order_id: String,
    #[serde(default)]
    pub provider_preference: String,
}

impl CheckoutRequest {
    /// Applies the checkout rules in order and reports the first violation.
    pub fn validate(&self) -> AppResult<()> {
        if self.merchant_id.is_empty() {
            return Err(AppError::invalid_argument("merchant_id is required"));
        }
        if self.amount <= 0 {
            return Err(AppError::invalid_argument("amount must be positive"));
        }
        if self.amount > MAX_AMOUNT {
            return Err(AppError::invalid_argument("amount exceeds maximum"));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(AppError::invalid_argument(
                "currency must be 3-character ISO code",
            ));
        }
        if self.order_id.is_empty() {
            return Err(AppError::invalid_argument("order_id is required"));
        }
        if self.order_id.len() > MAX_REFERENCE_LEN {
            return Err(AppError::invalid_argument("order_id too long"));
        }
        if !is_valid_reference(&self.order_id, MAX_REFERENCE_LEN) {
            return Err(AppError::invalid_argument(
                "order_id contains invalid characters",
            ));
        }
        if self.provider_preference.is_empty() {
            return Err(AppError::invalid_argument("provider_preference is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub provider_tx_id: String,
}
