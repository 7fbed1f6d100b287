//! Business action applied to each dequeued webhook.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{EventRecord, StatusUpdate, TransactionStore, WebhookEventStore};
use crate::error::{AppError, AppResult};
use crate::models::WebhookJob;
use crate::payments::ProviderRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The transaction moved to a new status.
    Applied,
    /// The event was recorded but the transaction kept its status.
    Unchanged,
    /// `(provider, event_id)` was already processed.
    Duplicate,
}

impl JobOutcome {
    /// Duplicates never count as processed webhooks.
    pub fn counts_as_processed(&self) -> bool {
        !matches!(self, JobOutcome::Duplicate)
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &WebhookJob) -> AppResult<JobOutcome>;
}

/// Reconciles a verified webhook against local transaction state.
pub struct WebhookProcessor {
    registry: ProviderRegistry,
    transactions: Arc<dyn TransactionStore>,
    events: Arc<dyn WebhookEventStore>,
}

impl WebhookProcessor {
    pub fn new(
        registry: ProviderRegistry,
        transactions: Arc<dyn TransactionStore>,
        events: Arc<dyn WebhookEventStore>,
    ) -> Self {
        Self {
            registry,
            transactions,
            events,
        }
    }
}

#[async_trait]
impl JobHandler for WebhookProcessor {
    async fn handle(&self, job: &WebhookJob) -> AppResult<JobOutcome> {
        let adapter = self.registry.resolve(&job.provider)?;
        let notification = adapter.parse_notification(&job.event_id, job.payload.as_bytes())?;
        if notification.event_id.is_empty() {
            return Err(AppError::malformed("webhook has no event id"));
        }

        let record = self
            .events
            .record_event(&job.provider, &notification.event_id, job.payload.as_bytes())
            .await?;
        if record == EventRecord::AlreadyProcessed {
            debug!(
                "Duplicate webhook ignored: provider={}, event_id={}",
                job.provider, notification.event_id
            );
            return Ok(JobOutcome::Duplicate);
        }

        let tx = self
            .transactions
            .find_by_provider_ref(&job.provider, &notification.provider_tx_id)
            .await?
            .ok_or_else(|| AppError::not_found("Transaction", notification.provider_tx_id.clone()))?;

        let outcome = match notification.status {
            Some(status) => match self.transactions.apply_status(&tx.id, status).await? {
                StatusUpdate::Applied(updated) => {
                    info!(
                        "Transaction {} ({}/{}) is now {}",
                        updated.id, updated.provider, updated.provider_tx_id, updated.status
                    );
                    JobOutcome::Applied
                }
                StatusUpdate::Unchanged(current) => {
                    debug!(
                        "Transaction {} stays {} (event requested {})",
                        current.id, current.status, status
                    );
                    JobOutcome::Unchanged
                }
            },
            None => JobOutcome::Unchanged,
        };

        self.events
            .mark_processed(&job.provider, &notification.event_id)
            .await?;
        Ok(outcome)
    }
}
