use crate::database::error::{DatabaseError, DbResult};
use crate::database::repository::MerchantStore;
use crate::payments::signature::sha256_hex;
use async_trait::async_trait;
use sqlx::PgPool;

/// Hash stored for a merchant API key.
pub fn hash_api_key(api_key: &str) -> String {
    sha256_hex(api_key.as_bytes())
}

pub struct MerchantRepository {
    pool: PgPool,
}

impl MerchantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MerchantStore for MerchantRepository {
    async fn lookup_by_api_key(&self, api_key_hash: &str) -> DbResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT id FROM merchants WHERE api_key_hash = $1")
            .bind(api_key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)
    }
}
