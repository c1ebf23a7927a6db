// PostgreSQL store over diesel-async + bb8
// Counters are bumped with `SET x = x + 1`; idempotent inserts use ON CONFLICT DO NOTHING;
// `last_sent` only moves forward through a predicate update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use uuid::Uuid;

use super::{InsertOutcome, NewsletterStore, StoreError, SubscriptionChanges};
use crate::db::DieselPool;
use crate::models::{
    ContentItem, DeliveryLogEntry, Frequency, NewDeliveryLogEntry, NewReferralLink,
    NewSubscription, PrivacyLink, Publisher, ReferralLink, Subscription, SubscriptionStatus,
    TierFilter, VisibilityTier,
};
use crate::schema::{
    content_items, newsletter_delivery_log, newsletter_subscriptions, privacy_level_links,
    referral_links, users,
};

// =============================================================================
// ROW TYPES
// =============================================================================

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PublisherRow {
    id: Uuid,
    username: String,
    full_name: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PublisherRow> for Publisher {
    fn from(row: PublisherRow) -> Self {
        Publisher {
            id: row.id,
            username: row.username,
            full_name: row.full_name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = content_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ContentRow {
    id: Uuid,
    user_id: Uuid,
    tier: String,
    tier_rank: i16,
    kind: String,
    summary: String,
    occurred_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ContentRow> for ContentItem {
    type Error = StoreError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        Ok(ContentItem {
            id: row.id,
            user_id: row.user_id,
            tier: VisibilityTier::from_parts(&row.tier, row.tier_rank as i64)?,
            kind: row.kind,
            summary: row.summary,
            occurred_at: row.occurred_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable, Insertable)]
#[diesel(table_name = privacy_level_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct PrivacyLinkRow {
    id: Uuid,
    user_id: Uuid,
    tier: String,
    tier_rank: i16,
    link_code: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<&PrivacyLink> for PrivacyLinkRow {
    fn from(link: &PrivacyLink) -> Self {
        PrivacyLinkRow {
            id: link.id,
            user_id: link.user_id,
            tier: link.tier.name().to_string(),
            tier_rank: link.tier.rank() as i16,
            link_code: link.link_code.clone(),
            is_active: link.is_active,
            created_at: link.created_at,
        }
    }
}

impl TryFrom<PrivacyLinkRow> for PrivacyLink {
    type Error = StoreError;

    fn try_from(row: PrivacyLinkRow) -> Result<Self, Self::Error> {
        Ok(PrivacyLink {
            id: row.id,
            user_id: row.user_id,
            tier: VisibilityTier::from_parts(&row.tier, row.tier_rank as i64)?,
            link_code: row.link_code,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = referral_links)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReferralRow {
    id: Uuid,
    user_id: Uuid,
    created_by_user_id: Uuid,
    friend_name: String,
    friend_email: Option<String>,
    tier: String,
    tier_rank: i16,
    referral_code: String,
    clicks: i64,
    conversions: i64,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReferralRow> for ReferralLink {
    type Error = StoreError;

    fn try_from(row: ReferralRow) -> Result<Self, Self::Error> {
        Ok(ReferralLink {
            id: row.id,
            user_id: row.user_id,
            created_by_user_id: row.created_by_user_id,
            friend_name: row.friend_name,
            friend_email: row.friend_email,
            tier: VisibilityTier::from_parts(&row.tier, row.tier_rank as i64)?,
            referral_code: row.referral_code,
            clicks: row.clicks,
            conversions: row.conversions,
            is_active: row.is_active,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = referral_links)]
struct NewReferralRow {
    id: Uuid,
    user_id: Uuid,
    created_by_user_id: Uuid,
    friend_name: String,
    friend_email: Option<String>,
    tier: String,
    tier_rank: i16,
    referral_code: String,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<NewReferralLink> for NewReferralRow {
    fn from(link: NewReferralLink) -> Self {
        NewReferralRow {
            id: link.id,
            user_id: link.user_id,
            created_by_user_id: link.created_by_user_id,
            friend_name: link.friend_name,
            friend_email: link.friend_email,
            tier: link.tier.name().to_string(),
            tier_rank: link.tier.rank() as i16,
            referral_code: link.referral_code,
            expires_at: link.expires_at,
            created_at: link.created_at,
        }
    }
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = newsletter_subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct SubscriptionRow {
    id: Uuid,
    source_user_id: Uuid,
    subscriber_email: String,
    subscriber_name: Option<String>,
    tier: String,
    tier_rank: i16,
    frequency: Frequency,
    status: SubscriptionStatus,
    subscription_code: String,
    referred_by: Option<Uuid>,
    referral_code: Option<String>,
    last_sent: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: row.id,
            source_user_id: row.source_user_id,
            subscriber_email: row.subscriber_email,
            subscriber_name: row.subscriber_name,
            tier: VisibilityTier::from_parts(&row.tier, row.tier_rank as i64)?,
            frequency: row.frequency,
            status: row.status,
            subscription_code: row.subscription_code,
            referred_by: row.referred_by,
            referral_code: row.referral_code,
            last_sent: row.last_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = newsletter_subscriptions)]
struct NewSubscriptionRow {
    id: Uuid,
    source_user_id: Uuid,
    subscriber_email: String,
    subscriber_name: Option<String>,
    tier: String,
    tier_rank: i16,
    frequency: Frequency,
    status: SubscriptionStatus,
    subscription_code: String,
    referred_by: Option<Uuid>,
    referral_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NewSubscription> for NewSubscriptionRow {
    fn from(sub: NewSubscription) -> Self {
        NewSubscriptionRow {
            id: sub.id,
            source_user_id: sub.source_user_id,
            subscriber_email: sub.subscriber_email,
            subscriber_name: sub.subscriber_name,
            tier: sub.tier.name().to_string(),
            tier_rank: sub.tier.rank() as i16,
            frequency: sub.frequency,
            status: SubscriptionStatus::Active,
            subscription_code: sub.subscription_code,
            referred_by: sub.referred_by,
            referral_code: sub.referral_code,
            created_at: sub.created_at,
            updated_at: sub.created_at,
        }
    }
}

#[derive(Debug, AsChangeset)]
#[diesel(table_name = newsletter_subscriptions)]
struct SubscriptionChangeset {
    frequency: Option<Frequency>,
    status: Option<SubscriptionStatus>,
    updated_at: DateTime<Utc>,
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Clone)]
pub struct PgNewsletterStore {
    pool: DieselPool,
}

impl PgNewsletterStore {
    pub fn new(pool: DieselPool) -> Self {
        Self { pool }
    }

    async fn conn(
        &self,
    ) -> Result<
        bb8::PooledConnection<
            '_,
            diesel_async::pooled_connection::AsyncDieselConnectionManager<
                diesel_async::AsyncPgConnection,
            >,
        >,
        StoreError,
    > {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl NewsletterStore for PgNewsletterStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        diesel::sql_query("SELECT 1").execute(&mut conn).await?;
        Ok(())
    }

    async fn find_publisher(&self, user_id: Uuid) -> Result<Option<Publisher>, StoreError> {
        let mut conn = self.conn().await?;
        let row = users::table
            .find(user_id)
            .select(PublisherRow::as_select())
            .first::<PublisherRow>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(Publisher::from))
    }

    async fn content_between(
        &self,
        user_id: Uuid,
        filter: &TierFilter,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, StoreError> {
        let mut conn = self.conn().await?;

        let mut query = content_items::table
            .filter(content_items::user_id.eq(user_id))
            .filter(content_items::occurred_at.gt(since))
            .filter(content_items::occurred_at.le(until))
            .into_boxed();

        query = match filter {
            TierFilter::MinRank(min) => query.filter(content_items::tier_rank.ge(*min as i16)),
            TierFilter::Exact { name, rank } => query
                .filter(content_items::tier.eq(name.clone()))
                .filter(content_items::tier_rank.eq(*rank as i16)),
        };

        let rows = query
            .order((content_items::occurred_at.asc(), content_items::id.asc()))
            .select(ContentRow::as_select())
            .load::<ContentRow>(&mut conn)
            .await?;
        collect(rows)
    }

    async fn find_active_privacy_link(
        &self,
        user_id: Uuid,
        tier: &VisibilityTier,
    ) -> Result<Option<PrivacyLink>, StoreError> {
        let mut conn = self.conn().await?;
        privacy_level_links::table
            .filter(privacy_level_links::user_id.eq(user_id))
            .filter(privacy_level_links::tier.eq(tier.name()))
            .filter(privacy_level_links::is_active.eq(true))
            .select(PrivacyLinkRow::as_select())
            .first::<PrivacyLinkRow>(&mut conn)
            .await
            .optional()?
            .map(PrivacyLink::try_from)
            .transpose()
    }

    async fn insert_privacy_link(
        &self,
        link: PrivacyLink,
    ) -> Result<InsertOutcome<PrivacyLink>, StoreError> {
        let mut conn = self.conn().await?;
        let row = PrivacyLinkRow::from(&link);

        // The partial unique index on (user_id, tier) WHERE is_active decides the winner
        let inserted = diesel::insert_into(privacy_level_links::table)
            .values(&row)
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;

        if inserted == 1 {
            return Ok(InsertOutcome::Created(link));
        }

        let existing = privacy_level_links::table
            .filter(privacy_level_links::user_id.eq(link.user_id))
            .filter(privacy_level_links::tier.eq(link.tier.name()))
            .filter(privacy_level_links::is_active.eq(true))
            .select(PrivacyLinkRow::as_select())
            .first::<PrivacyLinkRow>(&mut conn)
            .await?;
        Ok(InsertOutcome::Existing(existing.try_into()?))
    }

    async fn find_privacy_link_by_code(
        &self,
        code: &str,
    ) -> Result<Option<PrivacyLink>, StoreError> {
        let mut conn = self.conn().await?;
        privacy_level_links::table
            .filter(privacy_level_links::link_code.eq(code))
            .select(PrivacyLinkRow::as_select())
            .first::<PrivacyLinkRow>(&mut conn)
            .await
            .optional()?
            .map(PrivacyLink::try_from)
            .transpose()
    }

    async fn insert_referral_link(&self, link: NewReferralLink) -> Result<ReferralLink, StoreError> {
        let mut conn = self.conn().await?;
        diesel::insert_into(referral_links::table)
            .values(NewReferralRow::from(link))
            .returning(ReferralRow::as_returning())
            .get_result::<ReferralRow>(&mut conn)
            .await?
            .try_into()
    }

    async fn find_referral_link_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ReferralLink>, StoreError> {
        let mut conn = self.conn().await?;
        referral_links::table
            .filter(referral_links::referral_code.eq(code))
            .select(ReferralRow::as_select())
            .first::<ReferralRow>(&mut conn)
            .await
            .optional()?
            .map(ReferralLink::try_from)
            .transpose()
    }

    async fn record_referral_click(&self, code: &str) -> Result<Option<ReferralLink>, StoreError> {
        let mut conn = self.conn().await?;
        diesel::update(referral_links::table.filter(referral_links::referral_code.eq(code)))
            .set(referral_links::clicks.eq(referral_links::clicks + 1))
            .returning(ReferralRow::as_returning())
            .get_result::<ReferralRow>(&mut conn)
            .await
            .optional()?
            .map(ReferralLink::try_from)
            .transpose()
    }

    async fn list_referral_links(
        &self,
        created_by_user_id: Uuid,
    ) -> Result<Vec<ReferralLink>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = referral_links::table
            .filter(referral_links::created_by_user_id.eq(created_by_user_id))
            .order(referral_links::created_at.desc())
            .select(ReferralRow::as_select())
            .load::<ReferralRow>(&mut conn)
            .await?;
        collect(rows)
    }

    async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<InsertOutcome<Subscription>, StoreError> {
        let mut conn = self.conn().await?;
        let row = NewSubscriptionRow::from(subscription);

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                use newsletter_subscriptions::dsl as ns;

                let inserted = diesel::insert_into(ns::newsletter_subscriptions)
                    .values(&row)
                    .on_conflict((ns::source_user_id, ns::subscriber_email, ns::tier))
                    .do_nothing()
                    .returning(SubscriptionRow::as_returning())
                    .get_result::<SubscriptionRow>(conn)
                    .await
                    .optional()?;

                match inserted {
                    Some(created) => {
                        if let Some(referral_id) = created.referred_by {
                            diesel::update(referral_links::table.find(referral_id))
                                .set(referral_links::conversions.eq(referral_links::conversions + 1))
                                .execute(conn)
                                .await?;
                        }
                        Ok(InsertOutcome::Created(created.try_into()?))
                    },
                    None => {
                        let existing = ns::newsletter_subscriptions
                            .filter(ns::source_user_id.eq(row.source_user_id))
                            .filter(ns::subscriber_email.eq(&row.subscriber_email))
                            .filter(ns::tier.eq(&row.tier))
                            .select(SubscriptionRow::as_select())
                            .first::<SubscriptionRow>(conn)
                            .await?;
                        Ok(InsertOutcome::Existing(existing.try_into()?))
                    },
                }
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let mut conn = self.conn().await?;
        newsletter_subscriptions::table
            .find(id)
            .select(SubscriptionRow::as_select())
            .first::<SubscriptionRow>(&mut conn)
            .await
            .optional()?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn find_subscription_by_code(
        &self,
        code: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let mut conn = self.conn().await?;
        newsletter_subscriptions::table
            .filter(newsletter_subscriptions::subscription_code.eq(code))
            .select(SubscriptionRow::as_select())
            .first::<SubscriptionRow>(&mut conn)
            .await
            .optional()?
            .map(Subscription::try_from)
            .transpose()
    }

    async fn update_subscription(
        &self,
        code: &str,
        changes: SubscriptionChanges,
        now: DateTime<Utc>,
    ) -> Result<Option<Subscription>, StoreError> {
        use newsletter_subscriptions::dsl as ns;

        let mut conn = self.conn().await?;
        let changeset = SubscriptionChangeset {
            frequency: changes.frequency,
            status: changes.status,
            updated_at: now,
        };

        diesel::update(
            ns::newsletter_subscriptions
                .filter(ns::subscription_code.eq(code))
                .filter(ns::status.ne(SubscriptionStatus::Unsubscribed.as_str())),
        )
        .set(&changeset)
        .returning(SubscriptionRow::as_returning())
        .get_result::<SubscriptionRow>(&mut conn)
        .await
        .optional()?
        .map(Subscription::try_from)
        .transpose()
    }

    async fn list_subscriptions_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = newsletter_subscriptions::table
            .filter(newsletter_subscriptions::source_user_id.eq(user_id))
            .order(newsletter_subscriptions::created_at.desc())
            .select(SubscriptionRow::as_select())
            .load::<SubscriptionRow>(&mut conn)
            .await?;
        collect(rows)
    }

    async fn list_due(
        &self,
        frequency: Frequency,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, StoreError> {
        use newsletter_subscriptions::dsl as ns;

        let mut conn = self.conn().await?;
        let rows = ns::newsletter_subscriptions
            .filter(ns::status.eq(SubscriptionStatus::Active.as_str()))
            .filter(ns::frequency.eq(frequency.as_str()))
            .filter(ns::last_sent.is_null().or(ns::last_sent.le(cutoff)))
            .order(ns::created_at.asc())
            .select(SubscriptionRow::as_select())
            .load::<SubscriptionRow>(&mut conn)
            .await?;
        collect(rows)
    }

    async fn append_delivery_log(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError> {
        let mut conn = self.conn().await?;
        let entry = diesel::insert_into(newsletter_delivery_log::table)
            .values(&entry)
            .returning(DeliveryLogEntry::as_returning())
            .get_result::<DeliveryLogEntry>(&mut conn)
            .await?;
        Ok(entry)
    }

    async fn commit_delivery(
        &self,
        entry: NewDeliveryLogEntry,
    ) -> Result<DeliveryLogEntry, StoreError> {
        if !entry.status.advances_cadence() {
            return Err(StoreError::NotCommittable(entry.status));
        }
        let mut conn = self.conn().await?;

        conn.transaction::<_, StoreError, _>(|conn| {
            async move {
                use newsletter_subscriptions::dsl as ns;

                let advanced = diesel::update(
                    ns::newsletter_subscriptions
                        .filter(ns::id.eq(entry.subscription_id))
                        .filter(ns::last_sent.is_null().or(ns::last_sent.lt(entry.sent_at))),
                )
                .set((ns::last_sent.eq(entry.sent_at), ns::updated_at.eq(entry.sent_at)))
                .execute(conn)
                .await?;

                if advanced == 0 {
                    let exists = ns::newsletter_subscriptions
                        .find(entry.subscription_id)
                        .select(ns::id)
                        .first::<Uuid>(conn)
                        .await
                        .optional()?;
                    return Err(match exists {
                        Some(id) => StoreError::Superseded(id),
                        None => {
                            StoreError::NotFound(format!("subscription {}", entry.subscription_id))
                        },
                    });
                }

                let logged = diesel::insert_into(newsletter_delivery_log::table)
                    .values(&entry)
                    .returning(DeliveryLogEntry::as_returning())
                    .get_result::<DeliveryLogEntry>(conn)
                    .await?;
                Ok(logged)
            }
            .scope_boxed()
        })
        .await
    }

    async fn delivery_log_for_user(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let entries = newsletter_delivery_log::table
            .inner_join(newsletter_subscriptions::table)
            .filter(newsletter_subscriptions::source_user_id.eq(user_id))
            .filter(newsletter_delivery_log::sent_at.ge(since))
            .order(newsletter_delivery_log::sent_at.desc())
            .select(DeliveryLogEntry::as_select())
            .load::<DeliveryLogEntry>(&mut conn)
            .await?;
        Ok(entries)
    }

    async fn delivery_log_for_subscription(
        &self,
        subscription_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<DeliveryLogEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let entries = newsletter_delivery_log::table
            .filter(newsletter_delivery_log::subscription_id.eq(subscription_id))
            .filter(newsletter_delivery_log::sent_at.ge(since))
            .order(newsletter_delivery_log::sent_at.desc())
            .select(DeliveryLogEntry::as_select())
            .load::<DeliveryLogEntry>(&mut conn)
            .await?;
        Ok(entries)
    }
}
