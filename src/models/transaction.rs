use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Largest amount accepted, in the smallest currency unit.
pub const MAX_AMOUNT: i64 = 999_999_999;

/// Default length bound for provider references.
pub const MAX_REFERENCE_LEN: usize = 50;

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex compiles"))
}

/// Checks a provider-side reference: non-empty, at most `max_len` bytes, `[A-Za-z0-9_-]` only.
pub fn is_valid_reference(reference: &str, max_len: usize) -> bool {
    !reference.is_empty() && reference.len() <= max_len && reference_pattern().is_match(reference)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Failed,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Paid => "PAID",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Status only moves forward: PENDING to a terminal state, never back and never between terminals.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == TransactionStatus::Pending && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "PAID" => Ok(TransactionStatus::Paid),
            "FAILED" => Ok(TransactionStatus::Failed),
            "EXPIRED" => Ok(TransactionStatus::Expired),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// A payment attempt routed through one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub merchant_id: String,
    pub provider: String,
    pub provider_tx_id: String,
    pub amount: i64,
    pub currency: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// New PENDING transaction with a gateway-issued id.
    pub fn new_pending(
        merchant_id: &str,
        provider: &str,
        provider_tx_id: &str,
        amount: i64,
        currency: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            merchant_id: merchant_id.to_string(),
            provider: provider.to_string(),
            provider_tx_id: provider_tx_id.to_string(),
            amount,
            currency: currency.to_string(),
            status: TransactionStatus::Pending,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
