use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::{EventRecord, WebhookEventStore};
use crate::models::WebhookEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct WebhookEventRow {
    id: String,
    provider: String,
    event_id: String,
    payload: Vec<u8>,
    received_at: DateTime<Utc>,
    processed: bool,
    processed_at: Option<DateTime<Utc>>,
}

impl From<WebhookEventRow> for WebhookEvent {
    fn from(row: WebhookEventRow) -> Self {
        WebhookEvent {
            id: row.id,
            provider: row.provider,
            event_id: row.event_id,
            payload: row.payload,
            received_at: row.received_at,
            processed: row.processed,
            processed_at: row.processed_at,
        }
    }
}

/// Webhook event ledger keyed by `(provider, event_id)`
pub struct WebhookRepository {
    pool: PgPool,
}

impl WebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventStore for WebhookRepository {
    async fn record_event(
        &self,
        provider: &str,
        event_id: &str,
        payload: &[u8],
    ) -> DbResult<EventRecord> {
        let inserted = sqlx::query(
            "INSERT INTO webhook_events (id, provider, event_id, payload, received_at, processed)
             VALUES ($1, $2, $3, $4, NOW(), FALSE)
             ON CONFLICT (provider, event_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(provider)
        .bind(event_id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if inserted.rows_affected() == 1 {
            return Ok(EventRecord::New);
        }

        let processed: bool = sqlx::query_scalar(
            "SELECT processed FROM webhook_events WHERE provider = $1 AND event_id = $2",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(if processed {
            EventRecord::AlreadyProcessed
        } else {
            EventRecord::Pending
        })
    }

    async fn mark_processed(&self, provider: &str, event_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE webhook_events SET processed = TRUE, processed_at = NOW()
             WHERE provider = $1 AND event_id = $2 AND processed = FALSE",
        )
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 && self.find_event(provider, event_id).await?.is_none() {
            return Err(DatabaseError::not_found("WebhookEvent", event_id));
        }
        Ok(())
    }

    async fn find_event(&self, provider: &str, event_id: &str) -> DbResult<Option<WebhookEvent>> {
        let row = sqlx::query_as::<_, WebhookEventRow>(
            "SELECT id, provider, event_id, payload, received_at, processed, processed_at
             FROM webhook_events WHERE provider = $1 AND event_id = $2",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(row.map(WebhookEvent::from))
    }
}
