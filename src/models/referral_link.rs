// Referral links: friend-specific privacy links with click/conversion attribution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::visibility::VisibilityTier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReferralLink {
    pub id: Uuid,
    /// Publisher whose newsletter the link subscribes to
    pub user_id: Uuid,
    pub created_by_user_id: Uuid,
    pub friend_name: String,
    pub friend_email: Option<String>,
    pub tier: VisibilityTier,
    pub referral_code: String,
    pub clicks: i64,
    pub conversions: i64,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReferralLink {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now > expires_at)
    }

    pub fn metadata(&self) -> ReferralMetadata {
        ReferralMetadata {
            referral_code: self.referral_code.clone(),
            user_id: self.user_id,
            friend_name: self.friend_name.clone(),
            tier: self.tier.clone(),
            clicks: self.clicks,
            conversions: self.conversions,
            is_active: self.is_active,
            expires_at: self.expires_at,
        }
    }
}

/// What a resolution reports, including for expired or inactive links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReferralMetadata {
    pub referral_code: String,
    pub user_id: Uuid,
    pub friend_name: String,
    pub tier: VisibilityTier,
    pub clicks: i64,
    pub conversions: i64,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReferralLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub created_by_user_id: Uuid,
    pub friend_name: String,
    pub friend_email: Option<String>,
    pub tier: VisibilityTier,
    pub referral_code: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewReferralLink {
    pub fn into_link(self) -> ReferralLink {
        ReferralLink {
            id: self.id,
            user_id: self.user_id,
            created_by_user_id: self.created_by_user_id,
            friend_name: self.friend_name,
            friend_email: self.friend_email,
            tier: self.tier,
            referral_code: self.referral_code,
            clicks: 0,
            conversions: 0,
            is_active: true,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_is_strictly_after() {
        let now = Utc::now();
        let link = NewReferralLink {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            created_by_user_id: Uuid::new_v4(),
            friend_name: "Grace".to_string(),
            friend_email: None,
            tier: VisibilityTier::GoodFriends,
            referral_code: "ref".to_string(),
            expires_at: Some(now),
            created_at: now - Duration::days(1),
        }
        .into_link();

        assert!(!link.is_expired(now));
        assert!(link.is_expired(now + Duration::seconds(1)));
        assert_eq!(link.metadata().friend_name, "Grace");
    }
}
