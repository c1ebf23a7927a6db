// Subscription registry: subscriptions, privacy share-links and referral links

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Frequency, NewReferralLink, NewSubscription, PrivacyLink, ReferralLink, ReferralMetadata,
    Subscription, SubscriptionStatus, VisibilityTier,
};
use crate::services::clock::Clock;
use crate::services::codes::{generate_link_code, generate_subscription_code, is_well_formed};
use crate::store::{InsertOutcome, NewsletterStore, SubscriptionChanges};
use crate::utils::{normalize_email, trim_optional_field, NewsletterError};

/// `Created` for a new row, `Existing` when the unique key already held one
pub type SubscribeOutcome = InsertOutcome<Subscription>;

#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    /// Privacy link code or referral code
    pub code: String,
    pub email: String,
    pub frequency: Frequency,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReferralLinkCommand {
    pub user_id: Uuid,
    pub created_by_user_id: Uuid,
    pub friend_name: String,
    pub friend_email: Option<String>,
    pub tier: VisibilityTier,
    pub expires_at: Option<DateTime<Utc>>,
}

/// What a subscribe code points at, without side effects
#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Privacy(PrivacyLink),
    Referral(ReferralLink),
}

impl LinkTarget {
    pub fn user_id(&self) -> Uuid {
        match self {
            LinkTarget::Privacy(link) => link.user_id,
            LinkTarget::Referral(link) => link.user_id,
        }
    }

    pub fn tier(&self) -> &VisibilityTier {
        match self {
            LinkTarget::Privacy(link) => &link.tier,
            LinkTarget::Referral(link) => &link.tier,
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn NewsletterStore>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn NewsletterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn check_code(code: &str, what: &str) -> Result<(), NewsletterError> {
        if is_well_formed(code) {
            Ok(())
        } else {
            Err(NewsletterError::NotFound(what.to_string()))
        }
    }

    async fn require_publisher(&self, user_id: Uuid) -> Result<(), NewsletterError> {
        match self.store.find_publisher(user_id).await? {
            Some(_) => Ok(()),
            None => Err(NewsletterError::NotFound(format!("User {}", user_id))),
        }
    }

    /// Returns the active link for `(user_id, tier)`, creating it on first request
    #[instrument(skip(self), fields(tier = %tier))]
    pub async fn create_privacy_link(
        &self,
        user_id: Uuid,
        tier: VisibilityTier,
    ) -> Result<PrivacyLink, NewsletterError> {
        if let Some(existing) = self.store.find_active_privacy_link(user_id, &tier).await? {
            return Ok(existing);
        }
        self.require_publisher(user_id).await?;

        let link = PrivacyLink {
            id: Uuid::new_v4(),
            user_id,
            tier,
            link_code: generate_link_code(),
            is_active: true,
            created_at: self.clock.now(),
        };

        let outcome = self.store.insert_privacy_link(link).await?;
        if outcome.is_created() {
            info!(%user_id, "Created privacy link");
        }
        Ok(outcome.into_inner())
    }

    #[instrument(skip(self, command), fields(user_id = %command.user_id))]
    pub async fn create_referral_link(
        &self,
        command: ReferralLinkCommand,
    ) -> Result<ReferralLink, NewsletterError> {
        let now = self.clock.now();
        let friend_name = command.friend_name.trim().to_string();
        if friend_name.is_empty() {
            return Err(NewsletterError::Validation(
                "friend_name cannot be empty".to_string(),
            ));
        }
        if matches!(command.expires_at, Some(expires_at) if expires_at <= now) {
            return Err(NewsletterError::Validation(
                "expires_at must be in the future".to_string(),
            ));
        }

        self.require_publisher(command.user_id).await?;
        if command.created_by_user_id != command.user_id {
            self.require_publisher(command.created_by_user_id).await?;
        }

        let link = self
            .store
            .insert_referral_link(NewReferralLink {
                id: Uuid::new_v4(),
                user_id: command.user_id,
                created_by_user_id: command.created_by_user_id,
                friend_name,
                friend_email: trim_optional_field(command.friend_email.as_ref())
                    .map(|e| normalize_email(&e)),
                tier: command.tier,
                referral_code: generate_link_code(),
                expires_at: command.expires_at,
                created_at: now,
            })
            .await?;

        info!(referral_id = %link.id, "Created referral link");
        Ok(link)
    }

    /// Counts a click, then reports metadata. Expired or inactive links still
    /// report their metadata inside the error.
    #[instrument(skip(self, code))]
    pub async fn resolve_referral(&self, code: &str) -> Result<ReferralMetadata, NewsletterError> {
        Self::check_code(code, "Referral link")?;

        let link = self
            .store
            .record_referral_click(code)
            .await?
            .ok_or_else(|| NewsletterError::NotFound("Referral link".to_string()))?;

        Self::ensure_referral_usable(&link, self.clock.now())?;
        Ok(link.metadata())
    }

    fn ensure_referral_usable(link: &ReferralLink, now: DateTime<Utc>) -> Result<(), NewsletterError> {
        if !link.is_active {
            return Err(NewsletterError::ReferralInactive(Box::new(link.metadata())));
        }
        if link.is_expired(now) {
            return Err(NewsletterError::ReferralExpired(Box::new(link.metadata())));
        }
        Ok(())
    }

    /// Looks a code up as a privacy link first, then as a referral link
    pub async fn lookup_link(&self, code: &str) -> Result<LinkTarget, NewsletterError> {
        Self::check_code(code, "Subscription link")?;

        if let Some(link) = self.store.find_privacy_link_by_code(code).await? {
            return Ok(LinkTarget::Privacy(link));
        }
        if let Some(link) = self.store.find_referral_link_by_code(code).await? {
            return Ok(LinkTarget::Referral(link));
        }
        Err(NewsletterError::NotFound("Subscription link".to_string()))
    }

    /// Idempotent subscribe. A repeated call with the same
    /// `(publisher, email, tier)` returns the first row and changes nothing.
    #[instrument(skip(self, command), fields(frequency = %command.frequency))]
    pub async fn subscribe(
        &self,
        command: SubscribeCommand,
    ) -> Result<SubscribeOutcome, NewsletterError> {
        let email = normalize_email(&command.email);
        if !validator::validate_email(&email) {
            return Err(NewsletterError::Validation(
                "Invalid email address".to_string(),
            ));
        }
        let name = trim_optional_field(command.name.as_ref());
        let now = self.clock.now();

        let (user_id, tier, referral) = match self.lookup_link(&command.code).await? {
            LinkTarget::Privacy(link) => {
                if !link.is_active {
                    return Err(NewsletterError::LinkInactive);
                }
                (link.user_id, link.tier, None)
            },
            LinkTarget::Referral(link) => {
                Self::ensure_referral_usable(&link, now)?;
                (link.user_id, link.tier.clone(), Some(link))
            },
        };

        let outcome = self
            .store
            .create_subscription(NewSubscription {
                id: Uuid::new_v4(),
                source_user_id: user_id,
                subscriber_email: email,
                subscriber_name: name,
                tier,
                frequency: command.frequency,
                subscription_code: generate_subscription_code(),
                referred_by: referral.as_ref().map(|r| r.id),
                referral_code: referral.map(|r| r.referral_code),
                created_at: now,
            })
            .await?;

        match &outcome {
            InsertOutcome::Created(sub) => {
                info!(subscription_id = %sub.id, referred = sub.referred_by.is_some(), "Subscription created")
            },
            InsertOutcome::Existing(sub) => {
                info!(subscription_id = %sub.id, status = %sub.status, "Subscription already exists")
            },
        }
        Ok(outcome)
    }

    /// `status -> unsubscribed`; a no-op when already unsubscribed
    #[instrument(skip(self, code))]
    pub async fn unsubscribe(&self, code: &str) -> Result<Subscription, NewsletterError> {
        let current = self.find_by_code(code).await?;
        if current.status == SubscriptionStatus::Unsubscribed {
            return Ok(current);
        }

        let changes = SubscriptionChanges {
            status: Some(SubscriptionStatus::Unsubscribed),
            ..Default::default()
        };
        match self
            .store
            .update_subscription(code, changes, self.clock.now())
            .await?
        {
            Some(updated) => {
                info!(subscription_id = %updated.id, "Unsubscribed");
                Ok(updated)
            },
            // Lost a race with another unsubscribe
            None => self.find_by_code(code).await,
        }
    }

    /// Frequency change and pause/resume through the subscription code
    #[instrument(skip(self, code))]
    pub async fn update_subscription(
        &self,
        code: &str,
        changes: SubscriptionChanges,
    ) -> Result<Subscription, NewsletterError> {
        if changes.is_empty() {
            return Err(NewsletterError::Validation(
                "Nothing to update".to_string(),
            ));
        }
        if changes.status == Some(SubscriptionStatus::Unsubscribed) {
            return Err(NewsletterError::Validation(
                "Use the unsubscribe operation to unsubscribe".to_string(),
            ));
        }

        let current = self.find_by_code(code).await?;
        if let Some(next) = changes.status {
            if !current.status.can_transition_to(next) {
                return Err(NewsletterError::InvalidTransition(format!(
                    "{} -> {}",
                    current.status, next
                )));
            }
        }
        if current.status.is_terminal() {
            return Err(NewsletterError::InvalidTransition(
                "subscription is unsubscribed".to_string(),
            ));
        }

        self.store
            .update_subscription(code, changes, self.clock.now())
            .await?
            .ok_or_else(|| {
                warn!("Subscription was unsubscribed during update");
                NewsletterError::InvalidTransition("subscription is unsubscribed".to_string())
            })
    }

    pub async fn find_by_code(&self, code: &str) -> Result<Subscription, NewsletterError> {
        Self::check_code(code, "Subscription")?;
        self.store
            .find_subscription_by_code(code)
            .await?
            .ok_or_else(|| NewsletterError::NotFound("Subscription".to_string()))
    }

    pub async fn list_subscriptions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, NewsletterError> {
        Ok(self.store.list_subscriptions_for_user(user_id).await?)
    }

    /// Subscriptions to `user_id`'s newsletter that came in through a referral link
    pub async fn list_referred_subscriptions(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Subscription>, NewsletterError> {
        let mut subscriptions = self.store.list_subscriptions_for_user(user_id).await?;
        subscriptions.retain(|s| s.referred_by.is_some());
        Ok(subscriptions)
    }

    pub async fn list_referral_links(
        &self,
        created_by_user_id: Uuid,
    ) -> Result<Vec<ReferralLink>, NewsletterError> {
        Ok(self.store.list_referral_links(created_by_user_id).await?)
    }

    /// Active subscriptions of `frequency` never sent or last sent at least one
    /// interval before `now` (boundary inclusive)
    pub async fn list_due(
        &self,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>, NewsletterError> {
        let cutoff = now - frequency.interval();
        Ok(self.store.list_due(frequency, cutoff).await?)
    }
}
