// Delivery log queries for publishers and operators

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{DeliveryLogEntry, DeliveryStatus};
use crate::services::clock::Clock;
use crate::store::NewsletterStore;
use crate::utils::NewsletterError;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct FailureRate {
    pub subscription_id: Uuid,
    pub window_hours: i64,
    pub total: usize,
    pub failed: usize,
    /// `failed / total`, 0 when there were no attempts
    pub rate: f64,
}

#[derive(Clone)]
pub struct DeliveryLogService {
    store: Arc<dyn NewsletterStore>,
    clock: Arc<dyn Clock>,
}

impl DeliveryLogService {
    pub fn new(store: Arc<dyn NewsletterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Start of a window reaching `window_hours` back from now
    fn window_start(&self, window_hours: i64) -> Result<DateTime<Utc>, NewsletterError> {
        if window_hours <= 0 {
            return Err(NewsletterError::Validation(
                "window_hours must be positive".to_string(),
            ));
        }
        Duration::try_hours(window_hours)
            .and_then(|window| self.clock.now().checked_sub_signed(window))
            .ok_or_else(|| NewsletterError::Validation("window_hours is too large".to_string()))
    }

    /// Entries for all of a publisher's subscriptions in the last `window_hours`, newest first
    pub async fn log_for_user(
        &self,
        user_id: Uuid,
        window_hours: i64,
    ) -> Result<Vec<DeliveryLogEntry>, NewsletterError> {
        let since = self.window_start(window_hours)?;
        Ok(self.store.delivery_log_for_user(user_id, since).await?)
    }

    /// Share of non-`sent` entries for one subscription in the last `window_hours`
    pub async fn recent_failure_rate(
        &self,
        subscription_id: Uuid,
        window_hours: i64,
    ) -> Result<FailureRate, NewsletterError> {
        let since = self.window_start(window_hours)?;
        if self.store.find_subscription(subscription_id).await?.is_none() {
            return Err(NewsletterError::NotFound("Subscription".to_string()));
        }

        let entries = self
            .store
            .delivery_log_for_subscription(subscription_id, since)
            .await?;

        let total = entries.len();
        let failed = entries
            .iter()
            .filter(|e| e.status != DeliveryStatus::Sent)
            .count();
        let rate = if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        };

        Ok(FailureRate {
            subscription_id,
            window_hours,
            total,
            failed,
            rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, NewDeliveryLogEntry, NewSubscription, VisibilityTier};
    use crate::services::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    async fn seeded() -> (DeliveryLogService, Uuid, Arc<ManualClock>) {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(MemoryStore::new());

        let sub = store
            .create_subscription(NewSubscription {
                id: Uuid::new_v4(),
                source_user_id: Uuid::new_v4(),
                subscriber_email: "reader@example.com".to_string(),
                subscriber_name: None,
                tier: VisibilityTier::Public,
                frequency: Frequency::Daily,
                subscription_code: "code-aaaaaaaaaaaaaaaa".to_string(),
                referred_by: None,
                referral_code: None,
                created_at: now - Duration::days(10),
            })
            .await
            .unwrap()
            .into_inner();

        let entries = [
            (now - Duration::hours(30), DeliveryStatus::Failed),
            (now - Duration::hours(3), DeliveryStatus::Failed),
            (now - Duration::hours(2), DeliveryStatus::Failed),
            (now - Duration::hours(1), DeliveryStatus::Sent),
        ];
        for (at, status) in entries {
            store
                .append_delivery_log(NewDeliveryLogEntry::new(
                    sub.id,
                    at,
                    status,
                    1,
                    None,
                    String::new(),
                ))
                .await
                .unwrap();
        }

        (DeliveryLogService::new(store, clock.clone()), sub.id, clock)
    }

    #[tokio::test]
    async fn test_failure_rate_within_window() {
        let (service, id, _) = seeded().await;
        let rate = service.recent_failure_rate(id, 24).await.unwrap();
        assert_eq!(rate.total, 3);
        assert_eq!(rate.failed, 2);
        assert!((rate.rate - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failure_rate_empty_window_is_zero() {
        let (service, id, clock) = seeded().await;
        clock.advance(Duration::days(5));
        let rate = service.recent_failure_rate(id, 1).await.unwrap();
        assert_eq!(rate.total, 0);
        assert_eq!(rate.rate, 0.0);
    }

    #[tokio::test]
    async fn test_window_and_subscription_are_validated() {
        let (service, id, _) = seeded().await;
        assert!(matches!(
            service.recent_failure_rate(id, 0).await,
            Err(NewsletterError::Validation(_))
        ));
        assert!(matches!(
            service.recent_failure_rate(Uuid::new_v4(), 24).await,
            Err(NewsletterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_window_is_rejected() {
        let (service, id, _) = seeded().await;
        for hours in [10_000_000_000, i64::MAX] {
            assert!(matches!(
                service.recent_failure_rate(id, hours).await,
                Err(NewsletterError::Validation(_))
            ));
            assert!(matches!(
                service.log_for_user(Uuid::new_v4(), hours).await,
                Err(NewsletterError::Validation(_))
            ));
        }
    }
}
