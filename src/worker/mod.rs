//! Single-loop webhook job dispatcher with bounded retry and dead-lettering.

pub mod processor;

pub use processor::{JobHandler, JobOutcome, WebhookProcessor};

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::models::WebhookJob;
use crate::queue::{Broker, DLQ_KEY, MAX_RETRIES, POLL_TIMEOUT, RETRY_DELAY, WEBHOOK_QUEUE_KEY};

/// Attempts for re-pushing a job before it is reported lost.
const PUSH_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Blocking-pop timeout; also bounds shutdown latency
    pub poll_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
    /// Pause after a broker transport error
    pub transport_backoff: Duration,
    /// Upper bound on one business action
    pub job_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: POLL_TIMEOUT,
            retry_delay: RETRY_DELAY,
            max_retries: MAX_RETRIES,
            transport_backoff: Duration::from_millis(500),
            job_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.poll_timeout < Duration::from_secs(1) || self.poll_timeout > Duration::from_secs(30) {
            return Err(AppError::invalid_argument(
                "poll timeout must be between 1s and 30s",
            ));
        }
        if self.transport_backoff < Duration::from_millis(100) {
            return Err(AppError::invalid_argument(
                "transport backoff must be at least 100ms",
            ));
        }
        Ok(())
    }
}

pub struct Worker {
    broker: Arc<dyn Broker>,
    handler: Arc<dyn JobHandler>,
    metrics: Arc<Metrics>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        broker: Arc<dyn Broker>,
        handler: Arc<dyn JobHandler>,
        metrics: Arc<Metrics>,
        config: WorkerConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            broker,
            handler,
            metrics,
            config,
        })
    }

    /// Runs until `shutdown` is cancelled. A job in flight is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Webhook worker started: queue={}, poll_timeout={:?}, max_retries={}",
            WEBHOOK_QUEUE_KEY, self.config.poll_timeout, self.config.max_retries
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Not raced against the token: dropping an in-flight pop could lose the value.
            let raw = match self
                .broker
                .blocking_pop_right(WEBHOOK_QUEUE_KEY, self.config.poll_timeout)
                .await
            {
                Ok(Some((_, value))) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to pop webhook job: {}", e);
                    if sleep_or_cancel(self.config.transport_backoff, &shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if shutdown.is_cancelled() {
                self.requeue_on_shutdown(&raw).await;
                break;
            }

            let job: WebhookJob = match serde_json::from_str(&raw) {
                Ok(job) => job,
                Err(e) => {
                    error!("Dropping malformed webhook job: {}", e);
                    continue;
                }
            };

            self.handle_job(job, &shutdown).await;
        }

        info!("Webhook worker stopped");
    }

    async fn handle_job(&self, job: WebhookJob, shutdown: &CancellationToken) {
        debug!(
            "Processing webhook job: provider={}, event_id={}, retries={}",
            job.provider, job.event_id, job.retries
        );

        let result = match tokio::time::timeout(self.config.job_timeout, self.handler.handle(&job)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::internal(format!(
                "job exceeded {:?}",
                self.config.job_timeout
            ))),
        };

        match result {
            Ok(outcome) => {
                if outcome.counts_as_processed() {
                    self.metrics.webhook_processed();
                }
                debug!(
                    "Webhook job done: provider={}, event_id={}, outcome={:?}",
                    job.provider, job.event_id, outcome
                );
            }
            Err(e) => self.retry_or_dead_letter(job, e, shutdown).await,
        }
    }

    async fn retry_or_dead_letter(
        &self,
        mut job: WebhookJob,
        err: AppError,
        shutdown: &CancellationToken,
    ) {
        if !err.is_retryable() {
            error!(
                "Webhook job failed permanently, moving to dead-letter queue: provider={}, event_id={}, error={}",
                job.provider, job.event_id, err
            );
            self.push_with_retry(DLQ_KEY, &job).await;
            self.metrics.webhook_failed();
        } else if job.retries < self.config.max_retries {
            job.retries += 1;
            warn!(
                "Webhook job failed, retrying: provider={}, event_id={}, attempt={}/{}, error={}",
                job.provider, job.event_id, job.retries, self.config.max_retries, err
            );
            // Cut short on shutdown; the job is re-pushed either way.
            sleep_or_cancel(self.config.retry_delay, shutdown).await;
            self.push_with_retry(WEBHOOK_QUEUE_KEY, &job).await;
        } else {
            error!(
                "Webhook job exhausted retries, moving to dead-letter queue: provider={}, event_id={}, error={}",
                job.provider, job.event_id, err
            );
            self.push_with_retry(DLQ_KEY, &job).await;
            self.metrics.webhook_failed();
        }
    }

    /// Returns a popped job to the consumer end so it is next after restart.
    async fn requeue_on_shutdown(&self, raw: &str) {
        info!("Shutdown requested, returning popped job to the queue");
        if let Err(e) = self.push_raw_with_retry(WEBHOOK_QUEUE_KEY, raw, true).await {
            error!("Webhook job lost during shutdown: {}", e);
        }
    }

    async fn push_with_retry(&self, key: &str, job: &WebhookJob) {
        let encoded = match serde_json::to_string(job) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode webhook job: {}", e);
                return;
            }
        };
        if let Err(e) = self.push_raw_with_retry(key, &encoded, false).await {
            error!(
                "Webhook job lost: provider={}, event_id={}, key={}, error={}",
                job.provider, job.event_id, key, e
            );
        }
    }

    async fn push_raw_with_retry(&self, key: &str, value: &str, to_tail: bool) -> AppResult<()> {
        let mut last_error = None;
        for attempt in 1..=PUSH_ATTEMPTS {
            let pushed = if to_tail {
                self.broker.push_right(key, value).await
            } else {
                self.broker.push_left(key, value).await
            };
            match pushed {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Push to {} failed (attempt {}/{}): {}", key, attempt, PUSH_ATTEMPTS, e);
                    last_error = Some(e);
                    if attempt < PUSH_ATTEMPTS {
                        tokio::time::sleep(self.config.transport_backoff).await;
                    }
                }
            }
        }
        Err(last_error
            .map(AppError::from)
            .unwrap_or_else(|| AppError::internal("push failed")))
    }
}

/// Sleeps for `duration` unless cancelled first. Returns `true` when cancelled.
async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.cancelled() => true,
    }
}
