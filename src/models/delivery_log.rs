// Append-only delivery log: one row per send attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use super::text_column_enum;

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
pub enum DeliveryStatus {
    Sent,
    Failed,
    /// Recipient permanently rejected by the mail transport
    Bounced,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Bounced => "bounced",
        }
    }

    /// Outcomes that advance `last_sent`
    pub fn advances_cadence(&self) -> bool {
        matches!(self, DeliveryStatus::Sent | DeliveryStatus::Bounced)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            "bounced" => Ok(DeliveryStatus::Bounced),
            _ => Err(format!("Invalid delivery status: {}", s)),
        }
    }
}

text_column_enum!(DeliveryStatus);

#[derive(
    Debug,
    Clone,
    PartialEq,
    Serialize,
    Deserialize,
    ToSchema,
    diesel::Queryable,
    diesel::Selectable,
)]
#[diesel(table_name = crate::schema::newsletter_delivery_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeliveryLogEntry {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub attempt: i32,
    pub error_message: Option<String>,
    pub content_preview: String,
}

#[derive(Debug, Clone, diesel::Insertable)]
#[diesel(table_name = crate::schema::newsletter_delivery_log)]
pub struct NewDeliveryLogEntry {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub attempt: i32,
    pub error_message: Option<String>,
    pub content_preview: String,
}

impl NewDeliveryLogEntry {
    pub fn new(
        subscription_id: Uuid,
        sent_at: DateTime<Utc>,
        status: DeliveryStatus,
        attempt: u32,
        error_message: Option<String>,
        content_preview: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subscription_id,
            sent_at,
            status,
            attempt: attempt as i32,
            error_message,
            content_preview,
        }
    }

    pub fn into_entry(self) -> DeliveryLogEntry {
        DeliveryLogEntry {
            id: self.id,
            subscription_id: self.subscription_id,
            sent_at: self.sent_at,
            status: self.status,
            attempt: self.attempt,
            error_message: self.error_message,
            content_preview: self.content_preview,
        }
    }
}
