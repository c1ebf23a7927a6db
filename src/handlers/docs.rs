// OpenAPI documentation for the newsletter API

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::models::{
    api::{
        CreatePrivacyLinkRequest, CreateReferralLinkRequest, DeliveryLogEntryResponse,
        DeliveryLogResponse, LinkInfoResponse, LinkKind, PreviewRequest, PrivacyLinkResponse,
        ReferralLinkResponse, SubscribeRequest, SubscribeResponse, SubscriptionResponse,
        UnsubscribeRequest, UpdateSubscriptionRequest,
    },
    DeliveryStatus, Frequency, ReferralLink, ReferralMetadata, SubscriptionStatus,
    VisibilityTier,
};
use crate::services::{
    delivery_log::FailureRate,
    dispatcher::{BatchReport, DigestPreview},
};

struct AdminKeyScheme;

impl Modify for AdminKeyScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "adminKey",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("ADMIN_API_KEY as a bearer token"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Newsletter API",
        description = "Tiered newsletter subscriptions, share links, referrals and delivery"
    ),
    paths(
        crate::handlers::newsletter::subscribe,
        crate::handlers::newsletter::unsubscribe,
        crate::handlers::newsletter::update_subscription,
        crate::handlers::newsletter::link_info,
        crate::handlers::newsletter::resolve_referral,
        crate::handlers::newsletter::create_privacy_link,
        crate::handlers::newsletter::create_referral_link,
        crate::handlers::newsletter::list_referral_links,
        crate::handlers::newsletter::list_subscriptions,
        crate::handlers::newsletter::list_referred_subscriptions,
        crate::handlers::newsletter::preview_digest,
        crate::handlers::newsletter::delivery_log,
        crate::handlers::newsletter::trigger_send,
        crate::handlers::newsletter::failure_rate,
    ),
    components(
        schemas(
            SubscribeRequest,
            SubscribeResponse,
            UnsubscribeRequest,
            UpdateSubscriptionRequest,
            SubscriptionResponse,
            CreatePrivacyLinkRequest,
            PrivacyLinkResponse,
            CreateReferralLinkRequest,
            ReferralLinkResponse,
            ReferralLink,
            ReferralMetadata,
            LinkInfoResponse,
            LinkKind,
            DeliveryLogResponse,
            DeliveryLogEntryResponse,
            DeliveryStatus,
            PreviewRequest,
            DigestPreview,
            BatchReport,
            FailureRate,
            Frequency,
            SubscriptionStatus,
            VisibilityTier,
        )
    ),
    modifiers(&AdminKeyScheme),
    tags(
        (name = "Subscriptions", description = "Subscribe, unsubscribe and manage"),
        (name = "Links", description = "Privacy share links"),
        (name = "Referrals", description = "Friend referral links and attribution"),
        (name = "Delivery", description = "Delivery log and digest previews"),
        (name = "Admin", description = "Operator endpoints")
    )
)]
pub struct NewsletterApiDoc;

/// Serve OpenAPI JSON specification at /api-docs/openapi.json
pub async fn serve_openapi_spec() -> Response {
    match NewsletterApiDoc::openapi().to_json() {
        Ok(spec) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            spec,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to serialize OpenAPI document: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = NewsletterApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.contains(&&"/api/v1/newsletter/subscribe".to_string()));
        assert!(paths.contains(&&"/api/v1/newsletter/admin/send/{frequency}".to_string()));
        assert!(paths.contains(&&"/api/v1/newsletter/preview".to_string()));
        assert!(paths.contains(&&"/api/v1/newsletter/users/{user_id}/referrals".to_string()));
        assert_eq!(doc.paths.paths.len(), 13);
    }
}
