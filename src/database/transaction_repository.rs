use crate::database::error::{DatabaseError, DatabaseErrorKind, DbResult};
use crate::database::repository::{
    StatusUpdate, TransactionStore, CHECKOUT_URL_KEY, PROVIDER_REFERENCE_KEY,
};
use crate::models::{Transaction, TransactionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use tracing::debug;

#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    id: String,
    merchant_id: String,
    provider: String,
    provider_tx_id: String,
    amount: i64,
    currency: String,
    status: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = DatabaseError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<TransactionStatus>().map_err(|message| {
            DatabaseError::new(DatabaseErrorKind::DecodeError { message })
        })?;
        let metadata = match row.metadata {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Ok(Transaction {
            id: row.id,
            merchant_id: row.merchant_id,
            provider: row.provider,
            provider_tx_id: row.provider_tx_id,
            amount: row.amount,
            currency: row.currency,
            status,
            metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, merchant_id, provider, provider_tx_id, amount, currency, status, \
                       metadata, created_at, updated_at";

/// Postgres-backed transaction store
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(row: Option<TransactionRow>) -> DbResult<Option<Transaction>> {
        row.map(Transaction::try_from).transpose()
    }
}

#[async_trait]
impl TransactionStore for TransactionRepository {
    async fn insert(&self, tx: &Transaction) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO transactions
                (id, merchant_id, provider, provider_tx_id, amount, currency, status, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&tx.id)
        .bind(&tx.merchant_id)
        .bind(&tx.provider)
        .bind(&tx.provider_tx_id)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(tx.status.as_str())
        .bind(serde_json::Value::Object(tx.metadata.clone()))
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> DbResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Self::decode(row)
    }

    async fn find_by_provider_ref(
        &self,
        provider: &str,
        provider_tx_id: &str,
    ) -> DbResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE provider = $1 AND provider_tx_id = $2",
            COLUMNS
        ))
        .bind(provider)
        .bind(provider_tx_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Self::decode(row)
    }

    async fn apply_status(&self, id: &str, status: TransactionStatus) -> DbResult<StatusUpdate> {
        if status.is_terminal() {
            // The WHERE clause is the monotonicity guard; concurrent writers race on it safely.
            let updated = sqlx::query_as::<_, TransactionRow>(&format!(
                "UPDATE transactions
                 SET status = $2, updated_at = GREATEST(NOW(), created_at)
                 WHERE id = $1 AND status = 'PENDING'
                 RETURNING {}",
                COLUMNS
            ))
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

            if let Some(tx) = Self::decode(updated)? {
                debug!("Transaction {} moved to {}", id, status);
                return Ok(StatusUpdate::Applied(tx));
            }
        }

        match self.find_by_id(id).await? {
            Some(tx) => Ok(StatusUpdate::Unchanged(tx)),
            None => Err(DatabaseError::not_found("Transaction", id)),
        }
    }

    async fn attach_checkout(
        &self,
        id: &str,
        provider_reference: &str,
        checkout_url: &str,
    ) -> DbResult<()> {
        let patch = json!({
            PROVIDER_REFERENCE_KEY: provider_reference,
            CHECKOUT_URL_KEY: checkout_url,
        });
        let result = sqlx::query(
            "UPDATE transactions
             SET metadata = metadata || $2, updated_at = GREATEST(NOW(), created_at)
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Transaction", id));
        }
        Ok(())
    }
}
