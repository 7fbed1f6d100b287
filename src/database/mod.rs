//! Postgres persistence for transactions, webhook events and merchants.

pub mod error;
pub mod memory;
pub mod merchant_repository;
pub mod repository;
pub mod transaction_repository;
pub mod webhook_repository;

pub use memory::InMemoryStore;
pub use merchant_repository::{hash_api_key, MerchantRepository};
pub use repository::{EventRecord, MerchantStore, StatusUpdate, TransactionStore, WebhookEventStore};
pub use transaction_repository::TransactionRepository;
pub use webhook_repository::WebhookRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::error::{DatabaseError, DatabaseErrorKind};

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            connection_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// Connects the pool and proves it with one acquired connection.
pub async fn init_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, DatabaseError> {
    info!(
        "Initializing database pool: max_connections={}, min_connections={}, connection_timeout={:?}",
        config.max_connections, config.min_connections, config.connection_timeout
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(|e| {
            log_error!("Failed to initialize database pool: {}", e);
            DatabaseError::from_sqlx(e)
        })?;

    pool.acquire().await.map_err(|e| {
        log_error!("Failed to acquire test connection: {}", e);
        DatabaseError::from_sqlx(e)
    })?;

    info!("Database pool initialized successfully");
    Ok(pool)
}

/// Applies the idempotent schema script.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::raw_sql(SCHEMA).execute(pool).await.map_err(|e| {
        log_error!("Schema migration failed: {}", e);
        DatabaseError::new(DatabaseErrorKind::MigrationError {
            message: e.to_string(),
        })
    })?;
    info!("Database schema is up to date");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
        warn!("Health check failed: {}", e);
        DatabaseError::from_sqlx(e)
    })?;
    Ok(())
}
