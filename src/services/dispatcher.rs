// Newsletter dispatcher: drives one delivery per due subscription
//
// Pending -> Aggregating -> Composing -> Sending -> {Committed, Retrying, PermanentlyFailed}
// Only `commit_delivery` may move `last_sent`, and only for a `sent` or `bounced` outcome.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::app_config::DeliveryConfig;
use crate::models::{
    DeliveryStatus, Frequency, NewDeliveryLogEntry, Subscription, VisibilityTier,
};
use crate::services::aggregator::ContentAggregator;
use crate::services::clock::Clock;
use crate::services::composer::DigestComposer;
use crate::services::email::{EmailError, EmailService};
use crate::services::registry::SubscriptionRegistry;
use crate::store::{NewsletterStore, StoreError};
use crate::utils::{preview, NewsletterError};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Terminal state of one subscription within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent, logged and `last_sent` advanced together
    Committed,
    /// Nothing new in the window; no email, cadence untouched
    Skipped,
    /// Aggregation or composition failed; retried next tick
    Deferred,
    /// Shutdown interrupted the backoff; the failed attempt is already logged
    Retrying,
    /// Every attempt failed; cadence untouched
    PermanentlyFailed,
    /// Recipient permanently rejected; logged and cadence advanced
    Bounced,
    /// Another worker committed a newer delivery first
    Superseded,
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryOutcome::Committed => "committed",
            DeliveryOutcome::Skipped => "skipped",
            DeliveryOutcome::Deferred => "deferred",
            DeliveryOutcome::Retrying => "retrying",
            DeliveryOutcome::PermanentlyFailed => "permanently_failed",
            DeliveryOutcome::Bounced => "bounced",
            DeliveryOutcome::Superseded => "superseded",
        };
        f.write_str(name)
    }
}

/// Counts per terminal state for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct BatchReport {
    pub frequency: Option<Frequency>,
    pub due: usize,
    pub committed: usize,
    pub skipped: usize,
    pub deferred: usize,
    pub retrying: usize,
    pub permanently_failed: usize,
    pub bounced: usize,
    pub superseded: usize,
    /// Left `Pending` because shutdown began before the worker started
    pub not_started: usize,
    /// Storage failures that prevented recording an outcome
    pub errors: usize,
}

impl BatchReport {
    fn new(frequency: Frequency, due: usize) -> Self {
        Self {
            frequency: Some(frequency),
            due,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: DeliveryOutcome) {
        let slot = match outcome {
            DeliveryOutcome::Committed => &mut self.committed,
            DeliveryOutcome::Skipped => &mut self.skipped,
            DeliveryOutcome::Deferred => &mut self.deferred,
            DeliveryOutcome::Retrying => &mut self.retrying,
            DeliveryOutcome::PermanentlyFailed => &mut self.permanently_failed,
            DeliveryOutcome::Bounced => &mut self.bounced,
            DeliveryOutcome::Superseded => &mut self.superseded,
        };
        *slot += 1;
    }
}

/// Digest a subscriber at `tier` would get for `since < occurred_at <= until`.
/// Nothing is sent or logged.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DigestPreview {
    pub user_id: Uuid,
    pub tier: VisibilityTier,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub item_count: usize,
    /// `None` when the window holds nothing visible at the tier
    pub content: Option<String>,
}

/// Exponential delay before `attempt + 1`, capped at 60 seconds
pub fn backoff_delay(retry_delay: Duration, attempt: u32) -> Duration {
    let exp = 2_u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    retry_delay
        .checked_mul(exp)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

fn with_jitter(base: Duration) -> Duration {
    // 0-25% of the base delay
    let jitter_millis = rand::thread_rng().gen_range(0..=(base.as_millis() / 4) as u64);
    base + Duration::from_millis(jitter_millis)
}

/// Resolves once shutdown is requested; never resolves if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn NewsletterStore>,
    registry: SubscriptionRegistry,
    aggregator: ContentAggregator,
    composer: DigestComposer,
    email: EmailService,
    clock: Arc<dyn Clock>,
    config: DeliveryConfig,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn NewsletterStore>,
        aggregator: ContentAggregator,
        composer: DigestComposer,
        email: EmailService,
        clock: Arc<dyn Clock>,
        config: DeliveryConfig,
    ) -> Self {
        // Dropping the sender leaves the receiver in "never shut down"
        let (_never, shutdown) = watch::channel(false);
        Self {
            registry: SubscriptionRegistry::new(store.clone(), clock.clone()),
            store,
            aggregator,
            composer,
            email,
            clock,
            config,
            shutdown,
        }
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// `trigger_send(frequency)`: every due subscription through the worker pool
    #[instrument(skip(self), fields(frequency = %frequency))]
    pub async fn run_batch(
        &self,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Result<BatchReport, NewsletterError> {
        let due = self.registry.list_due(frequency, now).await?;

        let mut report = BatchReport::new(frequency, due.len());
        if due.is_empty() {
            debug!("No subscriptions due");
            return Ok(report);
        }
        info!(due = due.len(), "Dispatching batch");

        let permits = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut workers = JoinSet::new();

        for subscription in due {
            if self.shutting_down() {
                report.not_started += 1;
                continue;
            }
            let Ok(permit) = permits.clone().acquire_owned().await else {
                report.not_started += 1;
                continue;
            };
            if self.shutting_down() {
                report.not_started += 1;
                continue;
            }

            let dispatcher = self.clone();
            workers.spawn(async move {
                let _permit = permit;
                let id = subscription.id;
                (id, dispatcher.deliver(subscription, now).await)
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(outcome),
                Ok((id, Err(e))) => {
                    error!(subscription_id = %id, "Delivery could not be recorded: {}", e);
                    report.errors += 1;
                },
                Err(e) => {
                    error!("Delivery worker panicked: {}", e);
                    report.errors += 1;
                },
            }
        }

        info!(
            committed = report.committed,
            skipped = report.skipped,
            deferred = report.deferred,
            retrying = report.retrying,
            failed = report.permanently_failed,
            bounced = report.bounced,
            not_started = report.not_started,
            errors = report.errors,
            "Batch finished"
        );
        Ok(report)
    }

    /// Aggregates and composes like a delivery would, with per-call instructions,
    /// without touching the mail transport or the delivery log. `since` defaults
    /// to the publisher's creation.
    #[instrument(skip(self, tier, instructions), fields(tier = %tier))]
    pub async fn preview(
        &self,
        user_id: Uuid,
        tier: VisibilityTier,
        since: Option<DateTime<Utc>>,
        instructions: Option<&str>,
    ) -> Result<DigestPreview, NewsletterError> {
        let publisher = self
            .store
            .find_publisher(user_id)
            .await?
            .ok_or_else(|| NewsletterError::NotFound("Publisher".to_string()))?;

        let until = self.clock.now();
        let since = since.unwrap_or(publisher.created_at);
        if since >= until {
            return Err(NewsletterError::Validation(
                "since must be in the past".to_string(),
            ));
        }

        let items = self.aggregator.aggregate(user_id, &tier, since, until).await?;
        let content = if items.is_empty() {
            None
        } else {
            Some(self.composer.compose(&items, &tier, instructions).await?)
        };

        debug!(items = items.len(), "Digest previewed");
        Ok(DigestPreview {
            user_id,
            tier,
            since,
            until,
            item_count: items.len(),
            content,
        })
    }

    /// One subscription for the tick at `now`. `Err` only when an outcome
    /// could not be written to storage.
    #[instrument(skip(self, subscription), fields(subscription_id = %subscription.id))]
    pub async fn deliver(
        &self,
        subscription: Subscription,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome, StoreError> {
        debug!(state = "Pending", "Delivery started");

        let Some(publisher) = self.store.find_publisher(subscription.source_user_id).await? else {
            warn!(state = "Deferred", "Publisher not found");
            return self
                .defer(&subscription, "publisher not found".to_string())
                .await;
        };

        debug!(state = "Aggregating");
        let since = ContentAggregator::window_start(&subscription, &publisher);
        let items = match self
            .aggregator
            .aggregate(subscription.source_user_id, &subscription.tier, since, now)
            .await
        {
            Ok(items) => items,
            Err(e) => {
                warn!(state = "Deferred", "Aggregation failed: {}", e);
                return self.defer(&subscription, format!("aggregation failed: {}", e)).await;
            },
        };

        if items.is_empty() {
            info!(state = "Skipped", "Nothing new since last delivery");
            return Ok(DeliveryOutcome::Skipped);
        }

        debug!(state = "Composing", items = items.len());
        let digest = match self.composer.compose(&items, &subscription.tier, None).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!(state = "Deferred", "Composition failed: {}", e);
                return self.defer(&subscription, format!("composition failed: {}", e)).await;
            },
        };

        let message = match self
            .email
            .build_digest(&subscription, &publisher, &digest, items.len())
        {
            Ok(message) => message,
            Err(e) => {
                warn!(state = "Deferred", "Rendering failed: {}", e);
                return self.defer(&subscription, format!("rendering failed: {}", e)).await;
            },
        };
        let content_preview = preview(
            message.text.as_deref().unwrap_or(&digest),
            self.config.content_preview_chars,
        );

        let max_attempts = self.config.max_attempts.max(1);
        let mut shutdown = self.shutdown.clone();

        for attempt in 1..=max_attempts {
            debug!(state = "Sending", attempt);
            let result = match tokio::time::timeout(
                self.config.send_timeout(),
                self.email.send(&message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(EmailError::Timeout(self.config.send_timeout_secs)),
            };

            match result {
                Ok(()) => {
                    let entry = NewDeliveryLogEntry::new(
                        subscription.id,
                        now,
                        DeliveryStatus::Sent,
                        attempt,
                        None,
                        content_preview,
                    );
                    return self.commit(entry, DeliveryOutcome::Committed).await;
                },
                Err(e) if e.is_bounce() => {
                    warn!(state = "Bounced", attempt, "Recipient rejected: {}", e);
                    let entry = NewDeliveryLogEntry::new(
                        subscription.id,
                        now,
                        DeliveryStatus::Bounced,
                        attempt,
                        Some(e.to_string()),
                        content_preview,
                    );
                    return self.commit(entry, DeliveryOutcome::Bounced).await;
                },
                Err(e) => {
                    self.store
                        .append_delivery_log(NewDeliveryLogEntry::new(
                            subscription.id,
                            self.clock.now(),
                            DeliveryStatus::Failed,
                            attempt,
                            Some(e.to_string()),
                            content_preview.clone(),
                        ))
                        .await?;

                    if attempt == max_attempts {
                        error!(
                            state = "PermanentlyFailed",
                            attempt, "All delivery attempts failed: {}", e
                        );
                        return Ok(DeliveryOutcome::PermanentlyFailed);
                    }

                    let delay = with_jitter(backoff_delay(self.config.retry_delay(), attempt));
                    warn!(state = "Retrying", attempt, ?delay, "Send failed: {}", e);

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {},
                        _ = shutdown_requested(&mut shutdown) => {
                            info!(state = "Retrying", attempt, "Shutdown during backoff");
                            return Ok(DeliveryOutcome::Retrying);
                        },
                    }
                },
            }
        }

        // max_attempts >= 1, so the loop always returns
        Ok(DeliveryOutcome::PermanentlyFailed)
    }

    async fn defer(
        &self,
        subscription: &Subscription,
        reason: String,
    ) -> Result<DeliveryOutcome, StoreError> {
        self.store
            .append_delivery_log(NewDeliveryLogEntry::new(
                subscription.id,
                self.clock.now(),
                DeliveryStatus::Failed,
                0,
                Some(reason),
                String::new(),
            ))
            .await?;
        Ok(DeliveryOutcome::Deferred)
    }

    async fn commit(
        &self,
        entry: NewDeliveryLogEntry,
        outcome: DeliveryOutcome,
    ) -> Result<DeliveryOutcome, StoreError> {
        let attempt = entry.attempt;
        match self.store.commit_delivery(entry).await {
            Ok(_) => {
                info!(state = %outcome, attempt, "Delivery committed");
                Ok(outcome)
            },
            Err(StoreError::Superseded(id)) => {
                warn!(subscription_id = %id, "Newer delivery already committed");
                Ok(DeliveryOutcome::Superseded)
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 10), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::from_secs(u32::MAX as u64), 2), MAX_BACKOFF);
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let base = Duration::from_millis(400);
        for _ in 0..50 {
            let delay = with_jitter(base);
            assert!(delay >= base && delay <= Duration::from_millis(500));
        }
        assert_eq!(with_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_report_counts_outcomes() {
        let mut report = BatchReport::new(Frequency::Daily, 3);
        report.record(DeliveryOutcome::Committed);
        report.record(DeliveryOutcome::Committed);
        report.record(DeliveryOutcome::Skipped);
        assert_eq!(report.committed, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.frequency, Some(Frequency::Daily));
    }
}
