// Visibility model: ordered privacy tiers and the inclusion law between
// a subscriber's tier and a content item's tier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Highest rank a tier may carry (the `Public` audience)
pub const MAX_TIER_RANK: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TierError {
    #[error("Unknown visibility tier: {0}")]
    Unknown(String),

    #[error("Tier rank {0} is outside 0..=4")]
    RankOutOfRange(i64),

    #[error("Tier '{name}' has rank {expected}, not {actual}")]
    RankMismatch { name: String, expected: u8, actual: i64 },

    #[error("Custom tier name is invalid: {0}")]
    InvalidName(String),
}

/// Audience scope attached to content items, links and subscriptions.
///
/// Rank 0 is the most restrictive audience (sees everything), rank 4 the
/// least restrictive (sees only public content). Custom tiers slot into
/// the same total order through their explicit rank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityTier {
    CloseFamily,
    BestFriends,
    GoodFriends,
    Acquaintances,
    Public,
    Custom { name: String, rank: u8 },
}

impl VisibilityTier {
    pub const BUILT_IN: [VisibilityTier; 5] = [
        VisibilityTier::CloseFamily,
        VisibilityTier::BestFriends,
        VisibilityTier::GoodFriends,
        VisibilityTier::Acquaintances,
        VisibilityTier::Public,
    ];

    /// Builds a custom tier, rejecting names that shadow a built-in tier
    pub fn custom(name: &str, rank: u8) -> Result<Self, TierError> {
        let name = name.trim().to_lowercase();
        if name.is_empty()
            || name.len() > 50
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TierError::InvalidName(name));
        }
        if Self::builtin_from_name(&name).is_some() {
            return Err(TierError::InvalidName(name));
        }
        if rank > MAX_TIER_RANK {
            return Err(TierError::RankOutOfRange(rank as i64));
        }
        Ok(VisibilityTier::Custom { name, rank })
    }

    pub fn rank(&self) -> u8 {
        match self {
            VisibilityTier::CloseFamily => 0,
            VisibilityTier::BestFriends => 1,
            VisibilityTier::GoodFriends => 2,
            VisibilityTier::Acquaintances => 3,
            VisibilityTier::Public => 4,
            VisibilityTier::Custom { rank, .. } => *rank,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            VisibilityTier::CloseFamily => "close_family",
            VisibilityTier::BestFriends => "best_friends",
            VisibilityTier::GoodFriends => "good_friends",
            VisibilityTier::Acquaintances => "acquaintances",
            VisibilityTier::Public => "public",
            VisibilityTier::Custom { name, .. } => name,
        }
    }

    /// Human label used in emails ("Close family")
    pub fn label(&self) -> String {
        let name = self.name().replace(['_', '-'], " ");
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    }

    fn builtin_from_name(name: &str) -> Option<Self> {
        Self::BUILT_IN.iter().find(|t| t.name() == name).cloned()
    }

    /// Rebuilds a tier from its persisted `(tier, tier_rank)` columns
    pub fn from_parts(name: &str, rank: i64) -> Result<Self, TierError> {
        if !(0..=MAX_TIER_RANK as i64).contains(&rank) {
            return Err(TierError::RankOutOfRange(rank));
        }
        match Self::builtin_from_name(name) {
            Some(tier) if tier.rank() as i64 == rank => Ok(tier),
            Some(tier) => Err(TierError::RankMismatch {
                name: name.to_string(),
                expected: tier.rank(),
                actual: rank,
            }),
            None => Self::custom(name, rank as u8),
        }
    }

    /// Whether a subscriber at `self` may see content tagged `content`
    pub fn admits(&self, content: &VisibilityTier, policy: TierMatchPolicy) -> bool {
        match policy {
            TierMatchPolicy::Cumulative => visible(content.rank(), self.rank()),
            TierMatchPolicy::Exact => content == self,
        }
    }
}

impl fmt::Display for VisibilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisibilityTier {
    type Err = TierError;

    /// Parses a built-in tier name; custom tiers need a rank and go through `custom`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace([' ', '-'], "_");
        Self::builtin_from_name(&normalized).ok_or_else(|| TierError::Unknown(s.to_string()))
    }
}

/// The single inclusion law: a subscriber at rank `r` sees content of rank `c` iff `c >= r`
pub fn visible(content_rank: u8, subscriber_rank: u8) -> bool {
    content_rank >= subscriber_rank
}

/// How subscriptions are matched to content tiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierMatchPolicy {
    /// Concentric circles: inner tiers also see everything outer tiers see
    #[default]
    Cumulative,
    /// Only content tagged with exactly the subscriber's tier
    Exact,
}

impl TierMatchPolicy {
    /// Storage-level filter equivalent to this policy for one subscriber tier
    pub fn filter_for(&self, subscriber: &VisibilityTier) -> TierFilter {
        match self {
            TierMatchPolicy::Cumulative => TierFilter::MinRank(subscriber.rank()),
            TierMatchPolicy::Exact => TierFilter::Exact {
                name: subscriber.name().to_string(),
                rank: subscriber.rank(),
            },
        }
    }
}

impl FromStr for TierMatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cumulative" => Ok(TierMatchPolicy::Cumulative),
            "exact" => Ok(TierMatchPolicy::Exact),
            other => Err(format!("expected 'cumulative' or 'exact', got '{}'", other)),
        }
    }
}

/// Content predicate pushed down to the storage collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierFilter {
    MinRank(u8),
    Exact { name: String, rank: u8 },
}

impl TierFilter {
    pub fn matches(&self, tier: &VisibilityTier) -> bool {
        match self {
            TierFilter::MinRank(min) => visible(tier.rank(), *min),
            TierFilter::Exact { name, rank } => tier.name() == name && tier.rank() == *rank,
        }
    }
}
