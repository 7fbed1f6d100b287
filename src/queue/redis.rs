//! Redis list broker on a bb8 connection pool.

use async_trait::async_trait;
use bb8::Pool;
use bb8_redis::RedisConnectionManager;
use redis::aio::MultiplexedConnection;
use redis::AsyncConnectionConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::error::{BrokerError, BrokerResult};
use super::Broker;

pub type RedisPool = Pool<RedisConnectionManager>;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub redis_url: String,
    pub max_connections: u32,
    pub min_idle: u32,
    pub connection_timeout: Duration,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    /// Client-side reply budget on the consumer connection. Must exceed any BRPOP timeout.
    pub blocking_response_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 16,
            min_idle: 2,
            connection_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(60),
            blocking_response_timeout: Duration::from_secs(35),
        }
    }
}

/// Builds the pool. An unreachable server is logged and tolerated; operations fail
/// until it comes back.
pub async fn init_broker_pool(config: BrokerConfig) -> BrokerResult<RedisPool> {
    info!(
        "Initializing Redis broker pool: max_connections={}, redis_url={}",
        config.max_connections, config.redis_url
    );

    let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
        error!("Failed to create Redis connection manager: {}", e);
        BrokerError::ConnectionError(e.to_string())
    })?;

    let pool = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_idle))
        .connection_timeout(config.connection_timeout)
        .max_lifetime(Some(config.max_lifetime))
        .idle_timeout(Some(config.idle_timeout))
        .test_on_check_out(false)
        .build_unchecked(manager);

    if let Err(e) = health_check(&pool).await {
        warn!("Initial Redis connection test failed, but continuing: {}", e);
    }

    info!("Redis broker pool initialized");
    Ok(pool)
}

pub async fn health_check(pool: &RedisPool) -> BrokerResult<()> {
    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
    Ok(())
}

/// Pushes go through the pool. Blocking pops use one dedicated connection whose
/// response timeout outlasts the BRPOP timeout, so the client never abandons a
/// reply the server has already popped.
pub struct RedisBroker {
    pool: RedisPool,
    client: redis::Client,
    consumer_config: AsyncConnectionConfig,
    blocking_response_timeout: Duration,
    consumer: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBroker {
    pub fn new(pool: RedisPool, config: &BrokerConfig) -> BrokerResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| BrokerError::ConnectionError(e.to_string()))?;
        let consumer_config = AsyncConnectionConfig::new()
            .set_connection_timeout(Some(config.connection_timeout))
            .set_response_timeout(Some(config.blocking_response_timeout));

        Ok(Self {
            pool,
            client,
            consumer_config,
            blocking_response_timeout: config.blocking_response_timeout,
            consumer: Mutex::new(None),
        })
    }

    async fn connect_consumer(&self) -> BrokerResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection_with_config(&self.consumer_config)
            .await
            .map_err(|e| BrokerError::ConnectionError(e.to_string()))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push_left(&self, key: &str, value: &str) -> BrokerResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn push_right(&self, key: &str, value: &str) -> BrokerResult<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn blocking_pop_right(
        &self,
        key: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<(String, String)>> {
        if timeout >= self.blocking_response_timeout {
            return Err(BrokerError::CommandError(format!(
                "pop timeout {:?} must be below the response timeout {:?}",
                timeout, self.blocking_response_timeout
            )));
        }

        // One pop at a time; the connection is reused only after a clean reply.
        let mut consumer = self.consumer.lock().await;
        let mut conn = match consumer.take() {
            Some(conn) => conn,
            None => self.connect_consumer().await?,
        };

        // BRPOP replies nil on timeout and [key, value] otherwise.
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        *consumer = Some(conn);
        Ok(popped)
    }
}
