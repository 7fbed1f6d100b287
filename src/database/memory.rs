//! In-process store implementing every store trait with the same guarantees as Postgres.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::merchant_repository::hash_api_key;
use crate::database::repository::{
    EventRecord, MerchantStore, StatusUpdate, TransactionStore, WebhookEventStore,
    CHECKOUT_URL_KEY, PROVIDER_REFERENCE_KEY,
};
use crate::models::{Transaction, TransactionStatus, WebhookEvent};

#[derive(Debug, Default)]
struct Tables {
    transactions: HashMap<String, Transaction>,
    /// (provider, provider_tx_id) -> transaction id
    provider_refs: HashMap<(String, String), String>,
    events: HashMap<(String, String), WebhookEvent>,
    merchants: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut guard = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    /// Registers a merchant under the hash of `api_key`.
    pub fn add_merchant(&self, merchant_id: &str, api_key: &str) {
        self.with_tables(|t| {
            t.merchants
                .insert(hash_api_key(api_key), merchant_id.to_string());
        });
    }

    pub fn transaction_count(&self) -> usize {
        self.with_tables(|t| t.transactions.len())
    }

    pub fn event_count(&self) -> usize {
        self.with_tables(|t| t.events.len())
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert(&self, tx: &Transaction) -> DbResult<()> {
        self.with_tables(|t| {
            let key = (tx.provider.clone(), tx.provider_tx_id.clone());
            if t.provider_refs.contains_key(&key) || t.transactions.contains_key(&tx.id) {
                return Err(DatabaseError::new(
                    DatabaseErrorKind::UniqueConstraintViolation {
                        constraint: "transactions_provider_ref_key".to_string(),
                    },
                ));
            }
            t.provider_refs.insert(key, tx.id.clone());
            t.transactions.insert(tx.id.clone(), tx.clone());
            Ok(())
        })
    }

    async fn find_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        Ok(self.with_tables(|t| t.transactions.get(id).cloned()))
    }

    async fn find_by_provider_ref(
        &self,
        provider: &str,
        provider_tx_id: &str,
    ) -> DbResult<Option<Transaction>> {
        Ok(self.with_tables(|t| {
            t.provider_refs
                .get(&(provider.to_string(), provider_tx_id.to_string()))
                .and_then(|id| t.transactions.get(id))
                .cloned()
        }))
    }

    async fn apply_status(&self, id: &str, status: TransactionStatus) -> DbResult<StatusUpdate> {
        self.with_tables(|t| {
            let tx = t
                .transactions
                .get_mut(id)
                .ok_or_else(|| DatabaseError::not_found("Transaction", id))?;
            if !tx.status.can_transition_to(status) {
                return Ok(StatusUpdate::Unchanged(tx.clone()));
            }
            tx.status = status;
            tx.updated_at = Utc::now().max(tx.created_at);
            Ok(StatusUpdate::Applied(tx.clone()))
        })
    }

    async fn attach_checkout(
        &self,
        id: &str,
        provider_reference: &str,
        checkout_url: &str,
    ) -> DbResult<()> {
        self.with_tables(|t| {
            let tx = t
                .transactions
                .get_mut(id)
                .ok_or_else(|| DatabaseError::not_found("Transaction", id))?;
            tx.metadata
                .insert(PROVIDER_REFERENCE_KEY.to_string(), json!(provider_reference));
            tx.metadata
                .insert(CHECKOUT_URL_KEY.to_string(), json!(checkout_url));
            tx.updated_at = Utc::now().max(tx.created_at);
            Ok(())
        })
    }
}

#[async_trait]
impl WebhookEventStore for InMemoryStore {
    async fn record_event(
        &self,
        provider: &str,
        event_id: &str,
        payload: &[u8],
    ) -> DbResult<EventRecord> {
        Ok(self.with_tables(|t| {
            let key = (provider.to_string(), event_id.to_string());
            match t.events.get(&key) {
                Some(event) if event.processed => EventRecord::AlreadyProcessed,
                Some(_) => EventRecord::Pending,
                None => {
                    t.events.insert(
                        key,
                        WebhookEvent {
                            id: Uuid::new_v4().to_string(),
                            provider: provider.to_string(),
                            event_id: event_id.to_string(),
                            payload: payload.to_vec(),
                            received_at: Utc::now(),
                            processed: false,
                            processed_at: None,
                        },
                    );
                    EventRecord::New
                }
            }
        }))
    }

    async fn mark_processed(&self, provider: &str, event_id: &str) -> DbResult<()> {
        self.with_tables(|t| {
            let event = t
                .events
                .get_mut(&(provider.to_string(), event_id.to_string()))
                .ok_or_else(|| DatabaseError::not_found("WebhookEvent", event_id))?;
            if !event.processed {
                event.processed = true;
                event.processed_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    async fn find_event(&self, provider: &str, event_id: &str) -> DbResult<Option<WebhookEvent>> {
        Ok(self.with_tables(|t| {
            t.events
                .get(&(provider.to_string(), event_id.to_string()))
                .cloned()
        }))
    }
}

#[async_trait]
impl MerchantStore for InMemoryStore {
    async fn lookup_by_api_key(&self, api_key_hash: &str) -> DbResult<Option<String>> {
        Ok(self.with_tables(|t| t.merchants.get(api_key_hash).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(order: &str) -> Transaction {
        Transaction::new_pending("m1", "midtrans", order, 50_000, "IDR")
    }

    #[tokio::test]
    async fn test_provider_reference_is_unique() {
        let store = InMemoryStore::new();
        store.insert(&pending("order-1")).await.unwrap();
        let err = store.insert(&pending("order-1")).await.unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn test_terminal_status_is_not_rewritten() {
        let store = InMemoryStore::new();
        let tx = pending("order-2");
        store.insert(&tx).await.unwrap();

        let first = store.apply_status(&tx.id, TransactionStatus::Paid).await.unwrap();
        assert!(matches!(first, StatusUpdate::Applied(ref t) if t.status == TransactionStatus::Paid));

        let second = store.apply_status(&tx.id, TransactionStatus::Expired).await.unwrap();
        assert!(matches!(second, StatusUpdate::Unchanged(ref t) if t.status == TransactionStatus::Paid));

        let found = store.find_by_provider_ref("midtrans", "order-2").await.unwrap().unwrap();
        assert_eq!(found.status, TransactionStatus::Paid);
        assert!(found.updated_at >= found.created_at);
    }

    #[tokio::test]
    async fn test_apply_status_unknown_id() {
        let store = InMemoryStore::new();
        let err = store.apply_status("missing", TransactionStatus::Paid).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_event_lifecycle() {
        let store = InMemoryStore::new();
        assert_eq!(store.record_event("xendit", "e1", b"{}").await.unwrap(), EventRecord::New);
        assert_eq!(store.record_event("xendit", "e1", b"{}").await.unwrap(), EventRecord::Pending);
        store.mark_processed("xendit", "e1").await.unwrap();
        assert_eq!(
            store.record_event("xendit", "e1", b"{}").await.unwrap(),
            EventRecord::AlreadyProcessed
        );
        assert_eq!(store.record_event("midtrans", "e1", b"{}").await.unwrap(), EventRecord::New);
        assert_eq!(store.event_count(), 2);
    }

    #[tokio::test]
    async fn test_merchant_lookup_by_hash() {
        let store = InMemoryStore::new();
        store.add_merchant("m1", "pk_test_abc");
        let found = store.lookup_by_api_key(&hash_api_key("pk_test_abc")).await.unwrap();
        assert_eq!(found.as_deref(), Some("m1"));
        assert!(store.lookup_by_api_key("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_attach_checkout_metadata() {
        let store = InMemoryStore::new();
        let tx = pending("order-3");
        store.insert(&tx).await.unwrap();
        store
            .attach_checkout(&tx.id, "snap_order-3_50000", "https://pay.example/x")
            .await
            .unwrap();
        let stored = store.find_by_id(&tx.id).await.unwrap().unwrap();
        assert_eq!(stored.metadata.get(PROVIDER_REFERENCE_KEY), Some(&json!("snap_order-3_50000")));
    }
}
