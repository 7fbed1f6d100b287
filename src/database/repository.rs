use crate::database::error::DbResult;
use crate::models::{Transaction, TransactionStatus, WebhookEvent};
use async_trait::async_trait;

/// Result of a guarded status write.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    /// The row moved from PENDING to the requested terminal status.
    Applied(Transaction),
    /// The transition was not allowed; the row is returned as stored.
    Unchanged(Transaction),
}

/// Result of inserting a webhook event if absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventRecord {
    /// First time this `(provider, event_id)` is seen.
    New,
    /// Seen before, but processing never completed.
    Pending,
    /// Seen and fully processed.
    AlreadyProcessed,
}

/// Transaction persistence
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a new transaction. `(provider, provider_tx_id)` must be unused.
    async fn insert(&self, tx: &Transaction) -> DbResult<()>;

    async fn find_by_id(&self, id: &str) -> DbResult<Option<Transaction>>;

    async fn find_by_provider_ref(
        &self,
        provider: &str,
        provider_tx_id: &str,
    ) -> DbResult<Option<Transaction>>;

    /// Move a transaction forward. Terminal rows are never rewritten.
    ///
    /// Fails with `NotFound` when the id is unknown.
    async fn apply_status(&self, id: &str, status: TransactionStatus) -> DbResult<StatusUpdate>;

    /// Merge the adapter's reference and hosted URL into the metadata.
    async fn attach_checkout(
        &self,
        id: &str,
        provider_reference: &str,
        checkout_url: &str,
    ) -> DbResult<()>;
}

/// Webhook idempotency ledger
#[async_trait]
pub trait WebhookEventStore: Send + Sync {
    async fn record_event(
        &self,
        provider: &str,
        event_id: &str,
        payload: &[u8],
    ) -> DbResult<EventRecord>;

    async fn mark_processed(&self, provider: &str, event_id: &str) -> DbResult<()>;

    async fn find_event(&self, provider: &str, event_id: &str) -> DbResult<Option<WebhookEvent>>;
}

#[async_trait]
pub trait MerchantStore: Send + Sync {
    /// Merchant id owning the API key with this SHA-256 hex hash.
    async fn lookup_by_api_key(&self, api_key_hash: &str) -> DbResult<Option<String>>;
}

/// Metadata keys written by `attach_checkout`.
pub const PROVIDER_REFERENCE_KEY: &str = "provider_reference";
pub const CHECKOUT_URL_KEY: &str = "checkout_url";
