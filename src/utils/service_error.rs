// Newsletter error taxonomy surfaced to callers
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::ReferralMetadata;
use crate::services::composer::SummarizeError;
use crate::services::email::EmailError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum NewsletterError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Referral link has expired")]
    ReferralExpired(Box<ReferralMetadata>),

    #[error("Referral link is inactive")]
    ReferralInactive(Box<ReferralMetadata>),

    #[error("Subscription link is inactive")]
    LinkInactive,

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Transient send failure: {0}")]
    TransientSendFailure(String),

    #[error("Delivery failed permanently: {0}")]
    PermanentFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl NewsletterError {
    /// Stable machine-readable code for UI collaborators
    pub fn code(&self) -> &'static str {
        match self {
            NewsletterError::NotFound(_) => "not_found",
            NewsletterError::Validation(_) => "validation_error",
            NewsletterError::ReferralExpired(_) => "referral_expired",
            NewsletterError::ReferralInactive(_) => "referral_inactive",
            NewsletterError::LinkInactive => "link_inactive",
            NewsletterError::InvalidTransition(_) => "invalid_transition",
            NewsletterError::Unauthorized => "unauthorized",
            NewsletterError::TransientSendFailure(_) => "transient_send_failure",
            NewsletterError::PermanentFailure(_) => "permanent_failure",
            NewsletterError::Storage(_) => "storage_error",
            NewsletterError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            NewsletterError::NotFound(_) => StatusCode::NOT_FOUND,
            NewsletterError::Validation(_) => StatusCode::BAD_REQUEST,
            NewsletterError::ReferralExpired(_)
            | NewsletterError::ReferralInactive(_)
            | NewsletterError::LinkInactive => StatusCode::GONE,
            NewsletterError::InvalidTransition(_) => StatusCode::CONFLICT,
            NewsletterError::Unauthorized => StatusCode::UNAUTHORIZED,
            NewsletterError::TransientSendFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            NewsletterError::PermanentFailure(_) => StatusCode::BAD_GATEWAY,
            NewsletterError::Storage(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            NewsletterError::Storage(_) | NewsletterError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
        }
    }
}

impl IntoResponse for NewsletterError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage details stay in the logs
        let message = match &self {
            NewsletterError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                "Storage error".to_string()
            },
            NewsletterError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            },
            other => other.to_string(),
        };

        let mut body = json!({
            "error": message,
            "code": self.code(),
            "status": status.as_u16()
        });

        if let NewsletterError::ReferralExpired(meta) | NewsletterError::ReferralInactive(meta) =
            &self
        {
            body["referral"] = json!(meta);
        }

        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for NewsletterError {
    fn from(error: validator::ValidationErrors) -> Self {
        NewsletterError::Validation(error.to_string())
    }
}

impl From<EmailError> for NewsletterError {
    fn from(error: EmailError) -> Self {
        if error.is_bounce() {
            NewsletterError::PermanentFailure(error.to_string())
        } else {
            NewsletterError::TransientSendFailure(error.to_string())
        }
    }
}

impl From<SummarizeError> for NewsletterError {
    fn from(error: SummarizeError) -> Self {
        NewsletterError::TransientSendFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VisibilityTier;
    use uuid::Uuid;

    async fn body_of(err: NewsletterError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_not_found_shape() {
        let (status, body) = body_of(NewsletterError::NotFound("Subscription".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "not_found");
        assert_eq!(body["status"], 404);
    }

    #[tokio::test]
    async fn test_expired_referral_carries_metadata() {
        let meta = ReferralMetadata {
            referral_code: "abc".to_string(),
            user_id: Uuid::new_v4(),
            friend_name: "Grace".to_string(),
            tier: VisibilityTier::BestFriends,
            clicks: 3,
            conversions: 0,
            is_active: true,
            expires_at: None,
        };
        let (status, body) = body_of(NewsletterError::ReferralExpired(Box::new(meta))).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], "referral_expired");
        assert_eq!(body["referral"]["friend_name"], "Grace");
        assert_eq!(body["referral"]["clicks"], 3);
    }

    #[tokio::test]
    async fn test_storage_details_are_hidden() {
        let (status, body) =
            body_of(NewsletterError::Storage(StoreError::Pool("conn refused".into()))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Storage error");
    }

    #[test]
    fn test_email_error_mapping() {
        assert!(matches!(
            NewsletterError::from(EmailError::Bounced("no mailbox".into())),
            NewsletterError::PermanentFailure(_)
        ));
        assert!(matches!(
            NewsletterError::from(EmailError::Timeout(30)),
            NewsletterError::TransientSendFailure(_)
        ));
    }
}
