// Domain models for the newsletter engine

/// Stores a string-backed enum in a `Text`/`Varchar` column through its
/// `as_str` and `FromStr` implementations.
macro_rules! text_column_enum {
    ($ty:ty) => {
        impl<DB> diesel::deserialize::FromSql<diesel::sql_types::Text, DB> for $ty
        where
            DB: diesel::backend::Backend,
            String: diesel::deserialize::FromSql<diesel::sql_types::Text, DB>,
        {
            fn from_sql(bytes: DB::RawValue<'_>) -> diesel::deserialize::Result<Self> {
                let value = String::from_sql(bytes)?;
                <$ty as std::str::FromStr>::from_str(&value).map_err(|e| e.into())
            }
        }

        impl<DB> diesel::serialize::ToSql<diesel::sql_types::Text, DB> for $ty
        where
            DB: diesel::backend::Backend,
            str: diesel::serialize::ToSql<diesel::sql_types::Text, DB>,
        {
            fn to_sql<'b>(
                &'b self,
                out: &mut diesel::serialize::Output<'b, '_, DB>,
            ) -> diesel::serialize::Result {
                self.as_str().to_sql(out)
            }
        }
    };
}

pub(crate) use text_column_enum;

pub mod api;
pub mod content;
pub mod delivery_log;
pub mod privacy_link;
pub mod referral_link;
pub mod subscription;
pub mod visibility;

pub use content::{ContentItem, Publisher};
pub use delivery_log::{DeliveryLogEntry, DeliveryStatus, NewDeliveryLogEntry};
pub use privacy_link::PrivacyLink;
pub use referral_link::{NewReferralLink, ReferralLink, ReferralMetadata};
pub use subscription::{Frequency, NewSubscription, Subscription, SubscriptionStatus};
pub use visibility::{TierFilter, TierMatchPolicy, VisibilityTier};
