mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use common::{midtrans_notification, post_json, send_json, test_app, wait_for};
use paylink::database::{InMemoryStore, TransactionStore};
use paylink::error::{AppError, AppResult};
use paylink::metrics::Metrics;
use paylink::models::{Transaction, TransactionStatus, WebhookJob};
use paylink::queue::{Enqueuer, MemoryBroker, DLQ_KEY, WEBHOOK_QUEUE_KEY};
use paylink::worker::{JobHandler, JobOutcome, WebhookProcessor, Worker, WorkerConfig};

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        poll_timeout: Duration::from_secs(1),
        retry_delay: Duration::from_millis(10),
        transport_backoff: Duration::from_millis(100),
        ..WorkerConfig::default()
    }
}

fn spawn_worker(
    broker: Arc<MemoryBroker>,
    handler: Arc<dyn JobHandler>,
    metrics: Arc<Metrics>,
) -> (CancellationToken, JoinHandle<()>) {
    let worker = Worker::new(broker, handler, metrics, fast_config()).unwrap();
    let token = CancellationToken::new();
    let shutdown = token.clone();
    let handle = tokio::spawn(async move { worker.run(shutdown).await });
    (token, handle)
}

async fn stop(token: CancellationToken, handle: JoinHandle<()>) {
    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
}

async fn seed_pending(store: &InMemoryStore, order_id: &str) -> Transaction {
    let tx = Transaction::new_pending("m1", "midtrans", order_id, 50_000, "IDR");
    store.insert(&tx).await.unwrap();
    tx
}

fn midtrans_job(order_id: &str, transaction_id: &str, status: &str) -> WebhookJob {
    let body = midtrans_notification(order_id, transaction_id, status);
    WebhookJob::new("midtrans", transaction_id, body.to_string())
}

/// Fails the first `failures` calls, then succeeds.
struct FlakyHandler {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyHandler {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn handle(&self, _job: &WebhookJob) -> AppResult<JobOutcome> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(AppError::internal("downstream unavailable"))
        } else {
            Ok(JobOutcome::Applied)
        }
    }
}

/// Takes `delay` per job and counts completions.
struct SlowHandler {
    delay: Duration,
    started: AtomicU32,
    completed: AtomicU32,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, _job: &WebhookJob) -> AppResult<JobOutcome> {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(JobOutcome::Applied)
    }
}

#[tokio::test]
async fn test_webhook_delivery_settles_transaction() {
    let app = test_app(false);
    let tx = seed_pending(&app.store, "order-456").await;

    let body = midtrans_notification("order-456", "txn-1", "settlement");
    let (status, _) = send_json(&app.router, post_json("/v1/webhook/midtrans", &body)).await;
    assert_eq!(status, axum::http::StatusCode::OK);

    let processor = Arc::new(WebhookProcessor::new(
        app.registry.clone(),
        app.store.clone(),
        app.store.clone(),
    ));
    let (token, handle) = spawn_worker(app.broker.clone(), processor, app.metrics.clone());

    let metrics = app.metrics.clone();
    assert!(wait_for(|| metrics.snapshot().webhooks_processed == 1, Duration::from_secs(5)).await);
    stop(token, handle).await;

    let stored = app.store.find_by_id(&tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert!(app.broker.is_empty(WEBHOOK_QUEUE_KEY));
    assert!(app.broker.is_empty(DLQ_KEY));
    assert_eq!(app.metrics.snapshot().webhooks_received, 1);
}

#[tokio::test]
async fn test_failing_job_is_dead_lettered_after_max_retries() {
    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let handler = Arc::new(FlakyHandler::new(u32::MAX));

    Enqueuer::new(broker.clone())
        .enqueue_webhook("midtrans", "evt-1", "{}".to_string())
        .await
        .unwrap();

    let (token, handle) = spawn_worker(broker.clone(), handler.clone(), metrics.clone());
    let dlq = broker.clone();
    assert!(wait_for(|| dlq.len(DLQ_KEY) == 1, Duration::from_secs(5)).await);
    stop(token, handle).await;

    // One attempt per delivery: the original plus three re-enqueues.
    assert_eq!(handler.calls(), 4);
    assert_eq!(broker.push_count(WEBHOOK_QUEUE_KEY), 4);
    assert!(broker.is_empty(WEBHOOK_QUEUE_KEY));

    let dead: WebhookJob = serde_json::from_str(&broker.items(DLQ_KEY)[0]).unwrap();
    assert_eq!(dead.retries, 3);
    assert_eq!(dead.event_id, "evt-1");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.webhooks_failed, 1);
    assert_eq!(snapshot.webhooks_processed, 0);
}

/// Rejects every job as unparsable.
struct RejectingHandler {
    calls: AtomicU32,
}

#[async_trait]
impl JobHandler for RejectingHandler {
    async fn handle(&self, _job: &WebhookJob) -> AppResult<JobOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::malformed("missing external_id"))
    }
}

#[tokio::test]
async fn test_permanent_failure_is_dead_lettered_at_once() {
    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let handler = Arc::new(RejectingHandler {
        calls: AtomicU32::new(0),
    });

    Enqueuer::new(broker.clone())
        .enqueue_webhook("xendit", "evt-bad", "{}".to_string())
        .await
        .unwrap();

    let mut config = fast_config();
    // A retry would be visible as a multi-second stall.
    config.retry_delay = Duration::from_secs(5);
    let worker = Worker::new(broker.clone(), handler.clone(), metrics.clone(), config).unwrap();
    let token = CancellationToken::new();
    let shutdown = token.clone();
    let handle = tokio::spawn(async move { worker.run(shutdown).await });

    let dlq = broker.clone();
    assert!(wait_for(|| dlq.len(DLQ_KEY) == 1, Duration::from_secs(2)).await);
    stop(token, handle).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(broker.push_count(WEBHOOK_QUEUE_KEY), 1);
    assert!(broker.is_empty(WEBHOOK_QUEUE_KEY));

    let dead: WebhookJob = serde_json::from_str(&broker.items(DLQ_KEY)[0]).unwrap();
    assert_eq!(dead.retries, 0);
    assert_eq!(dead.event_id, "evt-bad");
    assert_eq!(metrics.snapshot().webhooks_failed, 1);
}

#[tokio::test]
async fn test_unknown_provider_job_is_not_retried() {
    let app = test_app(false);
    let processor = Arc::new(WebhookProcessor::new(
        app.registry.clone(),
        app.store.clone(),
        app.store.clone(),
    ));
    Enqueuer::new(app.broker.clone())
        .enqueue_webhook("paypal", "evt-pp", "{}".to_string())
        .await
        .unwrap();

    let (token, handle) = spawn_worker(app.broker.clone(), processor, app.metrics.clone());
    let dlq = app.broker.clone();
    assert!(wait_for(|| dlq.len(DLQ_KEY) == 1, Duration::from_secs(2)).await);
    stop(token, handle).await;

    assert_eq!(app.broker.push_count(WEBHOOK_QUEUE_KEY), 1);
    assert_eq!(app.store.event_count(), 0);
}

#[tokio::test]
async fn test_transient_failures_recover_without_dead_letter() {
    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let handler = Arc::new(FlakyHandler::new(2));

    Enqueuer::new(broker.clone())
        .enqueue_webhook("xendit", "evt-2", "{}".to_string())
        .await
        .unwrap();

    let (token, handle) = spawn_worker(broker.clone(), handler.clone(), metrics.clone());
    let watched = metrics.clone();
    assert!(wait_for(|| watched.snapshot().webhooks_processed == 1, Duration::from_secs(5)).await);
    stop(token, handle).await;

    assert_eq!(handler.calls(), 3);
    assert_eq!(broker.push_count(WEBHOOK_QUEUE_KEY), 3);
    assert!(broker.is_empty(DLQ_KEY));
    assert_eq!(metrics.snapshot().webhooks_failed, 0);
}

#[tokio::test]
async fn test_duplicate_deliveries_converge() {
    let app = test_app(false);
    let tx = seed_pending(&app.store, "order-dup").await;
    let processor = WebhookProcessor::new(app.registry.clone(), app.store.clone(), app.store.clone());
    let job = midtrans_job("order-dup", "txn-9", "settlement");

    assert_eq!(processor.handle(&job).await.unwrap(), JobOutcome::Applied);
    assert_eq!(processor.handle(&job).await.unwrap(), JobOutcome::Duplicate);
    assert_eq!(processor.handle(&job).await.unwrap(), JobOutcome::Duplicate);

    let stored = app.store.find_by_id(&tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert_eq!(app.store.event_count(), 1);
}

#[tokio::test]
async fn test_terminal_status_is_never_overwritten() {
    let app = test_app(false);
    let tx = seed_pending(&app.store, "order-mono").await;
    let processor = WebhookProcessor::new(app.registry.clone(), app.store.clone(), app.store.clone());

    let paid = midtrans_job("order-mono", "txn-1", "settlement");
    let expired = midtrans_job("order-mono", "txn-1", "expire");
    let pending = midtrans_job("order-mono", "txn-1", "pending");

    assert_eq!(processor.handle(&paid).await.unwrap(), JobOutcome::Applied);
    assert_eq!(processor.handle(&expired).await.unwrap(), JobOutcome::Unchanged);
    assert_eq!(processor.handle(&pending).await.unwrap(), JobOutcome::Unchanged);

    let stored = app.store.find_by_id(&tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
}

#[tokio::test]
async fn test_duplicates_through_worker_count_once() {
    let app = test_app(false);
    let tx = seed_pending(&app.store, "order-w").await;
    let enqueuer = Enqueuer::new(app.broker.clone());
    let job = midtrans_job("order-w", "txn-5", "settlement");
    for _ in 0..3 {
        enqueuer
            .enqueue_webhook(&job.provider, &job.event_id, job.payload.clone())
            .await
            .unwrap();
    }

    let processor = Arc::new(WebhookProcessor::new(
        app.registry.clone(),
        app.store.clone(),
        app.store.clone(),
    ));
    let (token, handle) = spawn_worker(app.broker.clone(), processor, app.metrics.clone());
    let broker = app.broker.clone();
    assert!(wait_for(|| broker.is_empty(WEBHOOK_QUEUE_KEY), Duration::from_secs(5)).await);
    // Let the last popped job finish.
    tokio::time::sleep(Duration::from_millis(100)).await;
    stop(token, handle).await;

    let stored = app.store.find_by_id(&tx.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransactionStatus::Paid);
    assert_eq!(app.metrics.snapshot().webhooks_processed, 1);
    assert!(app.broker.is_empty(DLQ_KEY));
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_job() {
    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let handler = Arc::new(SlowHandler {
        delay: Duration::from_millis(300),
        started: AtomicU32::new(0),
        completed: AtomicU32::new(0),
    });

    let enqueuer = Enqueuer::new(broker.clone());
    enqueuer
        .enqueue_webhook("midtrans", "evt-a", "{}".to_string())
        .await
        .unwrap();
    enqueuer
        .enqueue_webhook("midtrans", "evt-b", "{}".to_string())
        .await
        .unwrap();

    let (token, handle) = spawn_worker(broker.clone(), handler.clone(), metrics.clone());
    let watched = handler.clone();
    assert!(wait_for(|| watched.started.load(Ordering::SeqCst) == 1, Duration::from_secs(5)).await);

    stop(token, handle).await;

    assert_eq!(handler.completed.load(Ordering::SeqCst), 1);
    assert_eq!(metrics.snapshot().webhooks_processed, 1);

    // The job not yet taken stays queued for the next worker.
    let remaining = broker.items(WEBHOOK_QUEUE_KEY);
    assert_eq!(remaining.len(), 1);
    let job: WebhookJob = serde_json::from_str(&remaining[0]).unwrap();
    assert_eq!(job.event_id, "evt-b");
}

#[tokio::test]
async fn test_malformed_job_is_dropped() {
    use paylink::queue::Broker;

    let broker = Arc::new(MemoryBroker::new());
    let metrics = Arc::new(Metrics::new().unwrap());
    let handler = Arc::new(FlakyHandler::new(0));

    broker
        .push_left(WEBHOOK_QUEUE_KEY, "not a job")
        .await
        .unwrap();
    Enqueuer::new(broker.clone())
        .enqueue_webhook("midtrans", "evt-ok", "{}".to_string())
        .await
        .unwrap();

    let (token, handle) = spawn_worker(broker.clone(), handler.clone(), metrics.clone());
    let watched = metrics.clone();
    assert!(wait_for(|| watched.snapshot().webhooks_processed == 1, Duration::from_secs(5)).await);
    stop(token, handle).await;

    assert_eq!(handler.calls(), 1);
    assert!(broker.is_empty(WEBHOOK_QUEUE_KEY));
    assert!(broker.is_empty(DLQ_KEY));
}

#[tokio::test]
async fn test_worker_stops_while_broker_is_down() {
    let broker = Arc::new(MemoryBroker::new());
    broker.set_available(false);
    let handler = Arc::new(FlakyHandler::new(0));

    let (token, handle) = spawn_worker(broker.clone(), handler.clone(), Arc::new(Metrics::new().unwrap()));
    tokio::time::sleep(Duration::from_millis(250)).await;

    stop(token, handle).await;
    assert_eq!(handler.calls(), 0);
}
