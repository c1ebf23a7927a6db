// Newsletter subscription model
// One row per (publisher, subscriber email, tier); never physically deleted

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_column_enum;
use super::visibility::VisibilityTier;

/// Delivery cadence of a subscription
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    diesel::expression::AsExpression,
    diesel::deserialize::FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }

    /// Minimum gap between two deliveries
    pub fn interval(&self) -> Duration {
        match self {
            Frequency::Daily => Duration::hours(24),
            Frequency::Weekly => Duration::days(7),
            Frequency::Monthly => Duration::days(30),
        }
    }

    /// Capitalized form used in subject lines
    pub fn title(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
            Frequency::Monthly => "Monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            _ => Err(format!("Invalid frequency: {}", s)),
        }
    }
}

text_column_enum!(Frequency);

/// Subscription lifecycle: active <-> paused, either -> unsubscribed (terminal)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    diesel::expression::AsExpression,
    diesel::deserialize::FromSqlRow,
)]
#[diesel(sql_type = diesel::sql_types::Text)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Unsubscribed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Unsubscribed => "unsubscribed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Unsubscribed)
    }

    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        !self.is_terminal() || next == SubscriptionStatus::Unsubscribed
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "paused" => Ok(SubscriptionStatus::Paused),
            "unsubscribed" => Ok(SubscriptionStatus::Unsubscribed),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

text_column_enum!(SubscriptionStatus);

/// A recipient's subscription to one publisher at one tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub source_user_id: Uuid,
    pub subscriber_email: String,
    pub subscriber_name: Option<String>,
    pub tier: VisibilityTier,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,
    /// Opaque token for unauthenticated management links
    pub subscription_code: String,
    pub referred_by: Option<Uuid>,
    pub referral_code: Option<String>,
    pub last_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Active, on `frequency`, and not sent after `cutoff`
    pub fn is_due(&self, frequency: Frequency, cutoff: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.frequency == frequency
            && self.last_sent.map_or(true, |last| last <= cutoff)
    }
}

/// Insert payload built by the registry
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: Uuid,
    pub source_user_id: Uuid,
    pub subscriber_email: String,
    pub subscriber_name: Option<String>,
    pub tier: VisibilityTier,
    pub frequency: Frequency,
    pub subscription_code: String,
    pub referred_by: Option<Uuid>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewSubscription {
    pub fn into_subscription(self) -> Subscription {
        Subscription {
            id: self.id,
            source_user_id: self.source_user_id,
            subscriber_email: self.subscriber_email,
            subscriber_name: self.subscriber_name,
            tier: self.tier,
            frequency: self.frequency,
            status: SubscriptionStatus::Active,
            subscription_code: self.subscription_code,
            referred_by: self.referred_by,
            referral_code: self.referral_code,
            last_sent: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subscription(last_sent: Option<DateTime<Utc>>) -> Subscription {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        NewSubscription {
            id: Uuid::new_v4(),
            source_user_id: Uuid::new_v4(),
            subscriber_email: "reader@example.com".to_string(),
            subscriber_name: None,
            tier: VisibilityTier::Public,
            frequency: Frequency::Daily,
            subscription_code: "code".to_string(),
            referred_by: None,
            referral_code: None,
            created_at: created,
        }
        .into_subscription()
        .with_last_sent(last_sent)
    }

    impl Subscription {
        fn with_last_sent(mut self, last_sent: Option<DateTime<Utc>>) -> Self {
            self.last_sent = last_sent;
            self
        }
    }

    #[test]
    fn test_due_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();
        let cutoff = now - Frequency::Daily.interval();
        assert!(subscription(None).is_due(Frequency::Daily, cutoff));
        assert!(subscription(Some(now - Duration::hours(24))).is_due(Frequency::Daily, cutoff));
        assert!(!subscription(Some(now - Duration::hours(23))).is_due(Frequency::Daily, cutoff));
        assert!(!subscription(None).is_due(Frequency::Weekly, cutoff));
    }

    #[test]
    fn test_paused_is_never_due() {
        let now = Utc::now();
        let mut sub = subscription(None);
        sub.status = SubscriptionStatus::Paused;
        assert!(!sub.is_due(Frequency::Daily, now));
    }

    #[test]
    fn test_unsubscribed_is_terminal() {
        assert!(SubscriptionStatus::Active.can_transition_to(SubscriptionStatus::Paused));
        assert!(SubscriptionStatus::Paused.can_transition_to(SubscriptionStatus::Active));
        assert!(!SubscriptionStatus::Unsubscribed.can_transition_to(SubscriptionStatus::Active));
        assert!(
            SubscriptionStatus::Unsubscribed.can_transition_to(SubscriptionStatus::Unsubscribed)
        );
    }

    #[test]
    fn test_frequency_intervals() {
        assert_eq!(Frequency::Daily.interval(), Duration::hours(24));
        assert_eq!(Frequency::Weekly.interval(), Duration::days(7));
        assert_eq!(Frequency::Monthly.interval(), Duration::days(30));
        assert_eq!("WEEKLY".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert!("hourly".parse::<Frequency>().is_err());
    }
}
