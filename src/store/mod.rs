// Storage collaborator for the newsletter engine
// Every method is one transactional unit; callers never compose them into
// larger read-modify-write sequences for shared counters or `last_sent`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    visibility::TierError, ContentItem, DeliveryLogEntry, DeliveryStatus, Frequency, NewDeliveryLogEntry,
    NewReferralLink, NewSubscription, PrivacyLink, Publisher, ReferralLink, Subscription,
    SubscriptionStatus, TierFilter, VisibilityTier,
};

pub use memory::MemoryStore;
pub use postgres::PgNewsletterStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Connection pool error: {0}")]
    Pool(String),

    /// The compare-and-commit on `last_sent` found a newer value
    #[error("Delivery for subscription {0} was already committed")]
    Superseded(Uuid),

    /// Only outcomes that advance the cadence go through `commit_delivery`
    #[error("A {0} delivery cannot be committed")]
    NotCommittable(DeliveryStatus),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Stored row is invalid: {0}")]
    Corrupt(String),
}

impl From<TierError> for StoreError {
    fn from(err: TierError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

/// Result of an insert that tolerates a unique-key collision
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Created(T),
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            InsertOutcome::Created(value) | InsertOutcome::Existing(value) => value,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, InsertOutcome::Created(_))
    }
}

/// Fields a subscriber may change through their subscription code
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionChanges {
    pub frequency: Option<Frequency>,
    pub status: Option<SubscriptionStatus>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.frequency.is_none() && self.status.is_none()
    }
}

#[async_trait]
pub trait NewsletterStore: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_publisher(&self, user_id: Uuid) -> Result<Option<Publisher>, StoreError>;

    /// Content of `user_id` with `since < occurred_at <= until` matching `filter`,
    /// ordered by `occurred_at` then `id`
    async fn content_between(
        &self,
        user_id: Uuid,
        filter: &TierFilter,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, StoreError>;

    async fn find_active_privacy_link(
        &self,
        user_id: Uuid,
        tier: &VisibilityTier,
    ) -> Result<Option<PrivacyLink>, StoreError>;

    /// Inserts unless an active link for `(user_id, tier)` exists, in which case that one wins
    async fn insert_privacy_link(
        &self,
        link: PrivacyLink,
    ) -> Result<InsertOutcome<PrivacyLink>, StoreError>;

    async fn find_privacy_link_by_code(&self, code: &str)
        -> Result<Option<PrivacyLink>, StoreError>;

    async fn insert_referral_link(&self, link: NewReferralLink) -> Result<ReferralLink, StoreError>;

    async fn find_referral_link_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ReferralLink>, StoreError>;

    /// Atomically increments `clicks` and returns the updated link
    async fn record_referral_click(&self, code: &str) -> Result<Option<ReferralLink>, StoreError>;

    async fn list_referral_links(
        &self,
        created_by_user_id: Uuid,
    ) -> Result<Vec<ReferralLink>, StoreError>;

    /// Inserts unless `(source_user_id, subscriber_email, tier)` exists.
    /// A created row with `referred_by` increments that link's `conversions`
    /// in the same transaction.
    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<InsertOutcome<Subscription>, StoreError>;

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError>;

    async fn find_subscription_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Subscription>, StoreError>;

    /// Applies `changes` iff the row is not unsubscribed; `None` when nothing matched
    async fn update_subscription(
        &self,
        code: &str,
        changes: SubscriptionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StoreError>;

    async fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Active subscriptions of `frequency` with `last_sent` null or `<= cutoff`
    async fn list_due(
        &self,
        frequency: Frequency,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError>;

    /// Appends an entry that does not touch `last_sent`
    async fn append_delivery_log(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError>;

    /// Advances `last_sent` to `entry.sent_at` iff it is null or older, and
    /// appends `entry`, in one transaction. Fails with `Superseded` otherwise,
    /// and with `NotCommittable` for an entry whose status does not advance the cadence.
    async fn commit_delivery(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError>;

    /// Entries for every subscription of `user_id` with `sent_at >= since`, newest first
    async fn delivery_log_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError>;

    async fn delivery_log_for_subscription(
        &self,
        subscription_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError>;
}
