// In-process store used for local development (STORAGE_BACKEND=memory) and tests.
// One mutex guards every table, so each trait method is atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{InsertOutcome, NewsletterStore, StoreError, SubscriptionChanges};
use crate::models::{
    ContentItem, DeliveryLogEntry, Frequency, NewDeliveryLogEntry, NewReferralLink,
    NewSubscription, PrivacyLink, Publisher, ReferralLink, Subscription, SubscriptionStatus,
    TierFilter, VisibilityTier,
};

#[derive(Debug, Default)]
struct Tables {
    publishers: Vec<Publisher>,
    content: Vec<ContentItem>,
    privacy_links: Vec<PrivacyLink>,
    referral_links: Vec<ReferralLink>,
    subscriptions: Vec<Subscription>,
    delivery_log: Vec<DeliveryLogEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishers are owned by the surrounding product; this seeds one
    pub async fn insert_publisher(&self, publisher: Publisher) {
        let mut tables = self.tables.lock().await;
        tables.publishers.retain(|p| p.id != publisher.id);
        tables.publishers.push(publisher);
    }

    /// Content is produced by the upload flow; this seeds one item
    pub async fn insert_content(&self, item: ContentItem) {
        self.tables.lock().await.content.push(item);
    }

    /// Deactivates a privacy link so it can no longer be used to subscribe
    pub async fn deactivate_privacy_link(&self, code: &str) -> bool {
        let mut tables = self.tables.lock().await;
        match tables.privacy_links.iter_mut().find(|l| l.link_code == code) {
            Some(link) => {
                link.is_active = false;
                true
            },
            None => false,
        }
    }

    pub async fn set_referral_active(&self, code: &str, is_active: bool) -> bool {
        let mut tables = self.tables.lock().await;
        match tables
            .referral_links
            .iter_mut()
            .find(|l| l.referral_code == code)
        {
            Some(link) => {
                link.is_active = is_active;
                true
            },
            None => false,
        }
    }

    /// Snapshot of every delivery log row, in insertion order
    pub async fn all_delivery_log(&self) -> Vec<DeliveryLogEntry> {
        self.tables.lock().await.delivery_log.clone()
    }

    pub async fn subscription_count(&self) -> usize {
        self.tables.lock().await.subscriptions.len()
    }
}

#[async_trait]
impl NewsletterStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_publisher(&self, user_id: Uuid) -> Result<Option<Publisher>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.publishers.iter().find(|p| p.id == user_id).cloned())
    }

    async fn content_between(
        &self,
        user_id: Uuid,
        filter: &TierFilter,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let tables = self.tables.lock().await;
        let mut items: Vec<ContentItem> = tables
            .content
            .iter()
            .filter(|c| c.user_id == user_id)
            .filter(|c| c.occurred_at > since && c.occurred_at <= until)
            .filter(|c| filter.matches(&c.tier))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_active_privacy_link(
        &self,
        user_id: Uuid,
        tier: &VisibilityTier,
    ) -> Result<Option<PrivacyLink>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .privacy_links
            .iter()
            .find(|l| l.user_id == user_id && l.tier.name() == tier.name() && l.is_active)
            .cloned())
    }

    async fn insert_privacy_link(
        &self,
        link: PrivacyLink,
    ) -> Result<InsertOutcome<PrivacyLink>, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.privacy_links.iter().find(|l| {
            l.user_id == link.user_id && l.tier.name() == link.tier.name() && l.is_active
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        tables.privacy_links.push(link.clone());
        Ok(InsertOutcome::Created(link))
    }

    async fn find_privacy_link_by_code(
        &self,
        code: &str,
    ) -> Result<Option<PrivacyLink>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .privacy_links
            .iter()
            .find(|l| l.link_code == code)
            .cloned())
    }

    async fn insert_referral_link(&self, link: NewReferralLink) -> Result<ReferralLink, StoreError> {
        let link = link.into_link();
        self.tables.lock().await.referral_links.push(link.clone());
        Ok(link)
    }

    async fn find_referral_link_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ReferralLink>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .referral_links
            .iter()
            .find(|l| l.referral_code == code)
            .cloned())
    }

    async fn record_referral_click(&self, code: &str) -> Result<Option<ReferralLink>, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables
            .referral_links
            .iter_mut()
            .find(|l| l.referral_code == code)
            .map(|link| {
                link.clicks += 1;
                link.clone()
            }))
    }

    async fn list_referral_links(
        &self,
        created_by_user_id: Uuid,
    ) -> Result<Vec<ReferralLink>, StoreError> {
        let tables = self.tables.lock().await;
        let mut links: Vec<ReferralLink> = tables
            .referral_links
            .iter()
            .filter(|l| l.created_by_user_id == created_by_user_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| Reverse(l.created_at));
        Ok(links)
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<InsertOutcome<Subscription>, StoreError> {
        let mut tables = self.tables.lock().await;

        if let Some(existing) = tables.subscriptions.iter().find(|s| {
            s.source_user_id == subscription.source_user_id
                && s.subscriber_email == subscription.subscriber_email
                && s.tier.name() == subscription.tier.name()
        }) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        if let Some(referral_id) = subscription.referred_by {
            let link = tables
                .referral_links
                .iter_mut()
                .find(|l| l.id == referral_id)
                .ok_or_else(|| StoreError::NotFound(format!("referral link {}", referral_id)))?;
            link.conversions += 1;
        }

        let created = subscription.into_subscription();
        tables.subscriptions.push(created.clone());
        Ok(InsertOutcome::Created(created))
    }

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.subscriptions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_subscription_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.subscription_code == code)
            .cloned())
    }

    async fn update_subscription(
        &self,
        code: &str,
        changes: SubscriptionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(subscription) = tables.subscriptions.iter_mut().find(|s| {
            s.subscription_code == code && s.status != SubscriptionStatus::Unsubscribed
        }) else {
            return Ok(None);
        };

        if let Some(frequency) = changes.frequency {
            subscription.frequency = frequency;
        }
        if let Some(status) = changes.status {
            subscription.status = status;
        }
        subscription.updated_at = now;
        Ok(Some(subscription.clone()))
    }

    async fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.lock().await;
        let mut subscriptions: Vec<Subscription> = tables
            .subscriptions
            .iter()
            .filter(|s| s.source_user_id == user_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| Reverse(s.created_at));
        Ok(subscriptions)
    }

    async fn list_due(
        &self,
        frequency: Frequency,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.is_due(frequency, cutoff))
            .cloned()
            .collect())
    }

    async fn append_delivery_log(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError> {
        let entry = entry.into_entry();
        self.tables.lock().await.delivery_log.push(entry.clone());
        Ok(entry)
    }

    async fn commit_delivery(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError> {
        if !entry.status.advances_cadence() {
            return Err(StoreError::NotCommittable(entry.status));
        }

        let mut tables = self.tables.lock().await;
        let subscription = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.id == entry.subscription_id)
            .ok_or_else(|| StoreError::NotFound(format!("subscription {}", entry.subscription_id)))?;

        if matches!(subscription.last_sent, Some(last) if last >= entry.sent_at) {
            return Err(StoreError::Superseded(subscription.id));
        }
        subscription.last_sent = Some(entry.sent_at);
        subscription.updated_at = entry.sent_at;

        let entry = entry.into_entry();
        tables.delivery_log.push(entry.clone());
        Ok(entry)
    }

    async fn delivery_log_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let owned: Vec<Uuid> = tables
            .subscriptions
            .iter()
            .filter(|s| s.source_user_id == user_id)
            .map(|s| s.id)
            .collect();
        let mut entries: Vec<DeliveryLogEntry> = tables
            .delivery_log
            .iter()
            .filter(|e| owned.contains(&e.subscription_id) && e.sent_at >= since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| Reverse(e.sent_at));
        Ok(entries)
    }

    async fn delivery_log_for_subscription(
        &self,
        subscription_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let tables = self.tables.lock().await;
        let mut entries: Vec<DeliveryLogEntry> = tables
            .delivery_log
            .iter()
            .filter(|e| e.subscription_id == subscription_id && e.sent_at >= since)
            .cloned()
            .collect();
        entries.sort_by_key(|e| Reverse(e.sent_at));
        Ok(entries)
    }
}
