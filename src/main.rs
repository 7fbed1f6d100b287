use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use paylink::api::{self, AppState};
use paylink::config::Config;
use paylink::database::{
    self, MerchantRepository, PoolConfig, TransactionRepository, WebhookRepository,
};
use paylink::metrics::Metrics;
use paylink::payments::ProviderRegistry;
use paylink::queue::{self, BrokerConfig, Enqueuer, RedisBroker};
use paylink::telemetry;
use paylink::worker::{WebhookProcessor, Worker, WorkerConfig};

/// Time the worker gets to finish its current job after the server stops.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("invalid configuration")?;
    telemetry::init(&config.server.log_format);

    info!("Starting PayLink gateway");
    info!("Environment: {}", config.server.environment);

    let pool = database::init_pool(
        &config.database.url(),
        PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        },
    )
    .await
    .context("database unreachable")?;
    database::health_check(&pool)
        .await
        .context("database health check failed")?;
    database::run_migrations(&pool)
        .await
        .context("schema migration failed")?;

    let broker_config = BrokerConfig {
        redis_url: config.redis.url(),
        ..BrokerConfig::default()
    };
    let redis_pool = queue::init_broker_pool(broker_config.clone())
        .await
        .context("invalid Redis configuration")?;
    let broker = Arc::new(
        RedisBroker::new(redis_pool, &broker_config).context("invalid Redis configuration")?,
    );

    let registry =
        ProviderRegistry::from_config(&config.providers).context("provider setup failed")?;
    let metrics = Arc::new(Metrics::new().context("metrics registry setup failed")?);
    let transactions = Arc::new(TransactionRepository::new(pool.clone()));

    let processor = WebhookProcessor::new(
        registry.clone(),
        transactions.clone(),
        Arc::new(WebhookRepository::new(pool.clone())),
    );
    let worker = Worker::new(
        broker.clone(),
        Arc::new(processor),
        metrics.clone(),
        WorkerConfig {
            poll_timeout: config.worker.poll_timeout,
            retry_delay: config.worker.retry_delay,
            ..WorkerConfig::default()
        },
    )
    .context("invalid worker configuration")?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let worker_handle = {
        let token = shutdown.clone();
        tokio::spawn(async move { worker.run(token).await })
    };

    let state = AppState {
        registry,
        transactions,
        merchants: Arc::new(MerchantRepository::new(pool.clone())),
        enqueuer: Enqueuer::new(broker),
        metrics,
        require_merchant_auth: config.server.require_merchant_auth,
    };
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    let server_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await;
    if let Err(e) = &served {
        error!("HTTP server error: {}", e);
        shutdown.cancel();
    }

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, worker_handle).await {
        Ok(Ok(())) => info!("Worker drained"),
        Ok(Err(e)) => error!("Worker task failed: {}", e),
        Err(_) => warn!("Worker did not stop within {:?}", SHUTDOWN_TIMEOUT),
    }

    pool.close().await;
    info!("PayLink gateway stopped");
    served.context("HTTP server failed")
}

async fn cancel_on_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    token.cancel();
}
