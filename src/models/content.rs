// Publisher-owned data read by the aggregator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::visibility::VisibilityTier;

/// The publishing user as far as newsletters are concerned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Publisher {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Publisher {
    /// Name shown to subscribers, falling back to the username
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// A timestamped fact or event tagged with one tier. Read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ContentItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub tier: VisibilityTier,
    /// Free-form category such as "milestone" or "travel"
    pub kind: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut publisher = Publisher {
            id: Uuid::new_v4(),
            username: "ada".to_string(),
            full_name: Some("Ada Lovelace".to_string()),
            created_at: Utc::now(),
        };
        assert_eq!(publisher.display_name(), "Ada Lovelace");

        publisher.full_name = Some("   ".to_string());
        assert_eq!(publisher.display_name(), "ada");

        publisher.full_name = None;
        assert_eq!(publisher.display_name(), "ada");
    }
}
