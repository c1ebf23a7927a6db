use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::visibility::VisibilityTier;

/// Shareable subscribe entry point for one `(user, tier)`.
/// At most one active link exists per pair; it is created lazily and reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PrivacyLink {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: VisibilityTier,
    pub link_code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
