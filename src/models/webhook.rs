use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted webhook envelope. `(provider, event_id)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub id: String,
    pub provider: String,
    pub event_id: String,
    pub payload: Vec<u8>,
    pub received_at: DateTime<Utc>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Queue payload handed from the webhook handler to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJob {
    pub provider: String,
    /// Id returned by signature verification; empty when the adapter could not derive one.
    #[serde(default)]
    pub event_id: String,
    /// Raw webhook body. Verified webhook bodies are JSON and therefore UTF-8.
    pub payload: String,
    #[serde(default)]
    pub retries: u32,
    pub created_at: DateTime<Utc>,
}

impl WebhookJob {
    pub fn new(provider: &str, event_id: &str, payload: String) -> Self {
        Self {
            provider: provider.to_string(),
            event_id: event_id.to_string(),
            payload,
            retries: 0,
            created_at: Utc::now(),
        }
    }
}
