// Content aggregator: the items one subscriber is entitled to see in a window

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::models::{ContentItem, Publisher, Subscription, TierMatchPolicy, VisibilityTier};
use crate::store::{NewsletterStore, StoreError};

#[derive(Clone)]
pub struct ContentAggregator {
    store: Arc<dyn NewsletterStore>,
    policy: TierMatchPolicy,
}

impl ContentAggregator {
    pub fn new(store: Arc<dyn NewsletterStore>, policy: TierMatchPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> TierMatchPolicy {
        self.policy
    }

    /// Items of `user_id` with `since < occurred_at <= until` visible at `tier`,
    /// ascending by `occurred_at`. An empty result is a valid "nothing new" answer.
    #[instrument(skip(self, tier), fields(tier = %tier))]
    pub async fn aggregate(
        &self,
        user_id: Uuid,
        tier: &VisibilityTier,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, StoreError> {
        if until <= since {
            return Ok(Vec::new());
        }

        let filter = self.policy.filter_for(tier);
        let mut items = self
            .store
            .content_between(user_id, &filter, since, until)
            .await?;

        // The storage filter is an optimisation; visibility is decided here
        items.retain(|item| tier.admits(&item.tier, self.policy));

        debug!(count = items.len(), "Aggregated content");
        Ok(items)
    }

    /// Window start for a subscription: its last delivery, or the publisher's creation
    pub fn window_start(subscription: &Subscription, publisher: &Publisher) -> DateTime<Utc> {
        subscription.last_sent.unwrap_or(publisher.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn content(user_id: Uuid, tier: VisibilityTier, at: DateTime<Utc>) -> ContentItem {
        ContentItem {
            id: Uuid::new_v4(),
            user_id,
            tier,
            kind: "event".to_string(),
            summary: "something happened".to_string(),
            occurred_at: at,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_window_is_half_open() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let at_since = content(user, VisibilityTier::Public, t0);
        let at_until = content(user, VisibilityTier::Public, t0 + Duration::hours(3));
        store.insert_content(at_since).await;
        store.insert_content(at_until.clone()).await;

        let aggregator = ContentAggregator::new(store, TierMatchPolicy::Cumulative);
        let items = aggregator
            .aggregate(user, &VisibilityTier::Public, t0, t0 + Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(items, vec![at_until]);
    }

    #[tokio::test]
    async fn test_results_are_ordered_and_scoped_to_user() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();

        let late = content(user, VisibilityTier::CloseFamily, t0 + Duration::hours(2));
        let early = content(user, VisibilityTier::Public, t0 + Duration::hours(1));
        store.insert_content(late.clone()).await;
        store.insert_content(early.clone()).await;
        store
            .insert_content(content(other, VisibilityTier::Public, t0 + Duration::hours(1)))
            .await;

        let aggregator = ContentAggregator::new(store, TierMatchPolicy::Cumulative);
        let items = aggregator
            .aggregate(user, &VisibilityTier::CloseFamily, t0, t0 + Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(items, vec![early, late]);
    }

    #[tokio::test]
    async fn test_exact_policy_drops_outer_tiers() {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        let family = content(user, VisibilityTier::CloseFamily, t0 + Duration::hours(1));
        store.insert_content(family.clone()).await;
        store
            .insert_content(content(user, VisibilityTier::Public, t0 + Duration::hours(2)))
            .await;

        let aggregator = ContentAggregator::new(store, TierMatchPolicy::Exact);
        let items = aggregator
            .aggregate(user, &VisibilityTier::CloseFamily, t0, t0 + Duration::hours(3))
            .await
            .unwrap();

        assert_eq!(items, vec![family]);
    }

    #[tokio::test]
    async fn test_empty_or_inverted_window() {
        let store = Arc::new(MemoryStore::new());
        let aggregator = ContentAggregator::new(store, TierMatchPolicy::Cumulative);
        let t0 = Utc::now();

        let items = aggregator
            .aggregate(Uuid::new_v4(), &VisibilityTier::Public, t0, t0)
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
