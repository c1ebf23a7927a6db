// Request and response bodies for the newsletter HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{
    DeliveryLogEntry, DeliveryStatus, Frequency, PrivacyLink, Publisher, ReferralLink,
    Subscription, SubscriptionStatus, VisibilityTier,
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SubscribeRequest {
    /// Privacy link code or referral code
    #[validate(length(min = 1, max = 128))]
    pub code: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "friend@example.com")]
    pub email: String,
    pub frequency: Frequency,
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UnsubscribeRequest {
    #[validate(length(min = 1, max = 128))]
    pub subscription_code: String,
}

/// Frequency change and pause/resume; at least one field must be set
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub frequency: Option<Frequency>,
    /// `true` pauses, `false` resumes
    pub paused: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePrivacyLinkRequest {
    pub user_id: Uuid,
    pub tier: VisibilityTier,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReferralLinkRequest {
    /// Publisher the friend will subscribe to
    pub user_id: Uuid,
    /// Defaults to `user_id`
    pub created_by_user_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Friend name must be 1-100 characters"))]
    pub friend_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub friend_email: Option<String>,
    pub tier: VisibilityTier,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Compose a digest for a tier without sending it
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PreviewRequest {
    pub user_id: Uuid,
    pub tier: VisibilityTier,
    /// Window start; defaults to the publisher's creation
    pub since: Option<DateTime<Utc>>,
    /// Overrides the configured summarizer instructions for this call
    #[validate(length(max = 2000, message = "Instructions must be at most 2000 characters"))]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReferralLinksQuery {
    pub created_by_user_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WindowQuery {
    /// Look-back window in hours
    pub window_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub id: Uuid,
    pub publisher_id: Uuid,
    pub subscriber_email: String,
    pub subscriber_name: Option<String>,
    pub tier: VisibilityTier,
    pub frequency: Frequency,
    pub status: SubscriptionStatus,
    pub subscription_code: String,
    /// Referral link the subscriber came in through
    pub referred_by: Option<Uuid>,
    pub referral_code: Option<String>,
    pub last_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub unsubscribe_url: String,
}

impl SubscriptionResponse {
    pub fn new(subscription: Subscription, unsubscribe_url: String) -> Self {
        Self {
            id: subscription.id,
            publisher_id: subscription.source_user_id,
            subscriber_email: subscription.subscriber_email,
            subscriber_name: subscription.subscriber_name,
            tier: subscription.tier,
            frequency: subscription.frequency,
            status: subscription.status,
            subscription_code: subscription.subscription_code,
            referred_by: subscription.referred_by,
            referral_code: subscription.referral_code,
            last_sent: subscription.last_sent,
            created_at: subscription.created_at,
            unsubscribe_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscribeResponse {
    /// `false` when the subscription already existed
    pub created: bool,
    pub subscription: SubscriptionResponse,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PrivacyLinkResponse {
    pub link_code: String,
    pub user_id: Uuid,
    pub tier: VisibilityTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub subscribe_url: String,
}

impl PrivacyLinkResponse {
    pub fn new(link: PrivacyLink, subscribe_url: String) -> Self {
        Self {
            link_code: link.link_code,
            user_id: link.user_id,
            tier: link.tier,
            is_active: link.is_active,
            created_at: link.created_at,
            subscribe_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReferralLinkResponse {
    #[serde(flatten)]
    pub link: ReferralLink,
    pub referral_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Privacy,
    Referral,
}

/// What the subscribe page needs to render a code
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LinkInfoResponse {
    pub code: String,
    pub kind: LinkKind,
    pub publisher_id: Uuid,
    pub publisher_username: String,
    pub publisher_name: String,
    pub tier: VisibilityTier,
    pub tier_label: String,
    /// `false` for deactivated or expired links
    pub is_active: bool,
    pub friend_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub frequencies: Vec<Frequency>,
}

impl LinkInfoResponse {
    pub fn for_privacy_link(link: &PrivacyLink, publisher: &Publisher) -> Self {
        Self {
            code: link.link_code.clone(),
            kind: LinkKind::Privacy,
            publisher_id: publisher.id,
            publisher_username: publisher.username.clone(),
            publisher_name: publisher.display_name().to_string(),
            tier: link.tier.clone(),
            tier_label: link.tier.label(),
            is_active: link.is_active,
            friend_name: None,
            expires_at: None,
            frequencies: Frequency::ALL.to_vec(),
        }
    }

    pub fn for_referral_link(link: &ReferralLink, publisher: &Publisher, now: DateTime<Utc>) -> Self {
        Self {
            code: link.referral_code.clone(),
            kind: LinkKind::Referral,
            publisher_id: publisher.id,
            publisher_username: publisher.username.clone(),
            publisher_name: publisher.display_name().to_string(),
            tier: link.tier.clone(),
            tier_label: link.tier.label(),
            is_active: link.is_active && !link.is_expired(now),
            friend_name: Some(link.friend_name.clone()),
            expires_at: link.expires_at,
            frequencies: Frequency::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryLogEntryResponse {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub attempt: i32,
    pub error_message: Option<String>,
    pub content_preview: String,
}

impl From<DeliveryLogEntry> for DeliveryLogEntryResponse {
    fn from(entry: DeliveryLogEntry) -> Self {
        Self {
            id: entry.id,
            subscription_id: entry.subscription_id,
            sent_at: entry.sent_at,
            status: entry.status,
            attempt: entry.attempt,
            error_message: entry.error_message,
            content_preview: entry.content_preview,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeliveryLogResponse {
    pub user_id: Uuid,
    pub window_hours: i64,
    pub entries: Vec<DeliveryLogEntryResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_subscribe_request_validation() {
        let valid = SubscribeRequest {
            code: "abc".to_string(),
            email: "friend@example.com".to_string(),
            frequency: Frequency::Weekly,
            name: None,
        };
        assert!(valid.validate().is_ok());

        let bad_email = SubscribeRequest {
            email: "nope".to_string(),
            ..valid.clone()
        };
        assert!(bad_email.validate().is_err());

        let long_name = SubscribeRequest {
            name: Some("x".repeat(101)),
            ..valid
        };
        assert!(long_name.validate().is_err());
    }

    #[test]
    fn test_preview_instructions_are_bounded() {
        let request = PreviewRequest {
            user_id: Uuid::new_v4(),
            tier: VisibilityTier::Public,
            since: None,
            instructions: Some("Keep it short.".to_string()),
        };
        assert!(request.validate().is_ok());

        let long = PreviewRequest {
            instructions: Some("x".repeat(2001)),
            ..request
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn test_expired_referral_info_is_inactive() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let publisher = Publisher {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            full_name: None,
            created_at: now,
        };
        let link = ReferralLink {
            id: Uuid::new_v4(),
            user_id: publisher.id,
            created_by_user_id: publisher.id,
            friend_name: "Grace".to_string(),
            friend_email: None,
            tier: VisibilityTier::BestFriends,
            referral_code: "ref-code-aaaaaaaaaaaa".to_string(),
            clicks: 0,
            conversions: 0,
            is_active: true,
            expires_at: Some(now - Duration::hours(1)),
            created_at: now - Duration::days(1),
        };

        let info = LinkInfoResponse::for_referral_link(&link, &publisher, now);
        assert!(!info.is_active);
        assert_eq!(info.kind, LinkKind::Referral);
        assert_eq!(info.publisher_name, "ada");
        assert_eq!(info.frequencies.len(), 3);
    }
}
