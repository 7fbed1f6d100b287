//! At-least-once webhook job queue over a list-based broker.

pub mod error;
pub mod memory;
pub mod redis;

pub use self::error::{BrokerError, BrokerResult};
pub use self::memory::MemoryBroker;
pub use self::redis::{init_broker_pool, BrokerConfig, RedisBroker, RedisPool};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::models::WebhookJob;

pub const WEBHOOK_QUEUE_KEY: &str = "queue:webhooks";
pub const DLQ_KEY: &str = "queue:webhooks:dlq";

/// Re-enqueue attempts before a job is dead-lettered.
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// List operations the queue relies on.
///
/// `push_left` followed by `blocking_pop_right` on the same key is FIFO. Once a push
/// returns `Ok`, the value stays in the list until popped.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append to the head of the list.
    async fn push_left(&self, key: &str, value: &str) -> BrokerResult<()>;

    /// Append to the tail, making the value the next one popped.
    async fn push_right(&self, key: &str, value: &str) -> BrokerResult<()>;

    /// Pop from the tail, waiting up to `timeout`. `Ok(None)` on timeout.
    async fn blocking_pop_right(
        &self,
        key: &str,
        timeout: Duration,
    ) -> BrokerResult<Option<(String, String)>>;
}

/// Producer side of the webhook queue.
#[derive(Clone)]
pub struct Enqueuer {
    broker: Arc<dyn Broker>,
}

impl Enqueuer {
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self { broker }
    }

    /// Returns only after the broker accepted the job.
    pub async fn enqueue_webhook(
        &self,
        provider: &str,
        event_id: &str,
        payload: String,
    ) -> BrokerResult<()> {
        let job = WebhookJob::new(provider, event_id, payload);
        let encoded = serde_json::to_string(&job)?;
        self.broker
            .push_left(WEBHOOK_QUEUE_KEY, &encoded)
            .await
            .map_err(|e| {
                error!("Failed to enqueue webhook for {}: {}", provider, e);
                e
            })?;
        debug!("Webhook enqueued: provider={}, event_id={}", provider, event_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_pushes_job_to_webhook_queue() {
        let broker = Arc::new(MemoryBroker::new());
        let enqueuer = Enqueuer::new(broker.clone());

        enqueuer
            .enqueue_webhook("midtrans", "txn-1", r#"{"order_id":"o-1"}"#.to_string())
            .await
            .unwrap();

        let items = broker.items(WEBHOOK_QUEUE_KEY);
        assert_eq!(items.len(), 1);
        let job: WebhookJob = serde_json::from_str(&items[0]).unwrap();
        assert_eq!(job.provider, "midtrans");
        assert_eq!(job.event_id, "txn-1");
        assert_eq!(job.retries, 0);
        assert_eq!(job.payload, r#"{"order_id":"o-1"}"#);
    }

    #[tokio::test]
    async fn test_enqueue_surfaces_broker_failure() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_available(false);
        let enqueuer = Enqueuer::new(broker.clone());

        let result = enqueuer
            .enqueue_webhook("xendit", "evt", "{}".to_string())
            .await;
        assert!(result.is_err());
        assert_eq!(broker.len(WEBHOOK_QUEUE_KEY), 0);
    }
}
