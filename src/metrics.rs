//! Process-wide counters and gauges exported in the Prometheus text format.

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub checkouts_created: u64,
    pub checkouts_by_provider: BTreeMap<String, u64>,
    pub webhooks_received: u64,
    pub webhooks_processed: u64,
    pub webhooks_failed: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Default)]
struct LatencyTotals {
    total_ms: u128,
    count: u64,
}

/// Shared as `Arc<Metrics>`. Owns its registry so tests never collide on names.
pub struct Metrics {
    registry: Registry,
    started_at: Instant,
    uptime_seconds: Gauge,
    requests: IntCounterVec,
    checkouts: IntCounter,
    checkouts_by_provider: IntCounterVec,
    webhooks: IntCounterVec,
    latency_avg_ms: Gauge,
    latency: Mutex<LatencyTotals>,
    providers_seen: Mutex<BTreeSet<String>>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uptime_seconds = Gauge::new("paylink_uptime_seconds", "Time since server start")?;
        let requests = IntCounterVec::new(
            Opts::new("paylink_requests_total", "Total number of requests"),
            &["status"],
        )?;
        let checkouts = IntCounter::new("paylink_checkouts_total", "Total checkouts created")?;
        let checkouts_by_provider = IntCounterVec::new(
            Opts::new("paylink_checkouts_by_provider", "Checkouts by provider"),
            &["provider"],
        )?;
        let webhooks = IntCounterVec::new(
            Opts::new("paylink_webhooks_total", "Total webhooks"),
            &["status"],
        )?;
        let latency_avg_ms = Gauge::new("paylink_latency_avg_ms", "Average request latency")?;

        registry.register(Box::new(uptime_seconds.clone()))?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(checkouts.clone()))?;
        registry.register(Box::new(checkouts_by_provider.clone()))?;
        registry.register(Box::new(webhooks.clone()))?;
        registry.register(Box::new(latency_avg_ms.clone()))?;

        // Fixed label values are exported as 0 before their first increment.
        for status in ["success", "failed"] {
            requests.with_label_values(&[status]);
        }
        for status in ["received", "processed", "failed"] {
            webhooks.with_label_values(&[status]);
        }

        Ok(Self {
            registry,
            started_at: Instant::now(),
            uptime_seconds,
            requests,
            checkouts,
            checkouts_by_provider,
            webhooks,
            latency_avg_ms,
            latency: Mutex::new(LatencyTotals::default()),
            providers_seen: Mutex::new(BTreeSet::new()),
        })
    }

    /// Counts one HTTP request and folds its latency into the lifetime mean.
    pub fn record_request(&self, success: bool, latency: Duration) {
        let status = if success { "success" } else { "failed" };
        self.requests.with_label_values(&[status]).inc();

        let mut totals = self.latency.lock().unwrap_or_else(|p| p.into_inner());
        totals.total_ms += latency.as_millis();
        totals.count += 1;
        self.latency_avg_ms
            .set(totals.total_ms as f64 / totals.count as f64);
    }

    pub fn record_checkout(&self, provider: &str) {
        self.checkouts.inc();
        self.checkouts_by_provider.with_label_values(&[provider]).inc();
        self.providers_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(provider.to_string());
    }

    pub fn webhook_received(&self) {
        self.webhooks.with_label_values(&["received"]).inc();
    }

    pub fn webhook_processed(&self) {
        self.webhooks.with_label_values(&["processed"]).inc();
    }

    pub fn webhook_failed(&self) {
        self.webhooks.with_label_values(&["failed"]).inc();
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let providers: Vec<String> = self
            .providers_seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect();
        let checkouts_by_provider = providers
            .into_iter()
            .map(|provider| {
                let count = self
                    .checkouts_by_provider
                    .with_label_values(&[provider.as_str()])
                    .get();
                (provider, count)
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            successful_requests: self.requests.with_label_values(&["success"]).get(),
            failed_requests: self.requests.with_label_values(&["failed"]).get(),
            checkouts_created: self.checkouts.get(),
            checkouts_by_provider,
            webhooks_received: self.webhooks.with_label_values(&["received"]).get(),
            webhooks_processed: self.webhooks.with_label_values(&["processed"]).get(),
            webhooks_failed: self.webhooks.with_label_values(&["failed"]).get(),
            avg_latency_ms: self.latency_avg_ms.get(),
        }
    }

    pub fn render_prometheus(&self) -> String {
        self.uptime_seconds
            .set(self.started_at.elapsed().as_secs_f64());

        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::from("# Error encoding metrics\n");
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|_| String::from("# Error converting metrics to UTF-8\n"))
    }
}
