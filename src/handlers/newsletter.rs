// Newsletter API handlers: subscriptions, share links, referrals and delivery

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    models::{
        api::{
            CreatePrivacyLinkRequest, CreateReferralLinkRequest, DeliveryLogEntryResponse,
            DeliveryLogResponse, LinkInfoResponse, PreviewRequest, PrivacyLinkResponse,
            ReferralLinkResponse, ReferralLinksQuery, SubscribeRequest, SubscribeResponse, SubscriptionResponse,
            UnsubscribeRequest, UpdateSubscriptionRequest, WindowQuery,
        },
        Frequency, ReferralLink, ReferralMetadata, Subscription, SubscriptionStatus,
    },
    services::{
        delivery_log::FailureRate,
        dispatcher::{BatchReport, DigestPreview},
        email::builders::{subscribe_url, unsubscribe_url},
        LinkTarget, ReferralLinkCommand, SubscribeCommand,
    },
    store::SubscriptionChanges,
    utils::NewsletterError,
};

const DEFAULT_LOG_WINDOW_HOURS: i64 = 24 * 7;
const DEFAULT_FAILURE_WINDOW_HOURS: i64 = 24;

fn subscription_response(state: &AppState, subscription: Subscription) -> SubscriptionResponse {
    let url = unsubscribe_url(
        &state.config.server.public_base_url,
        &subscription.subscription_code,
    );
    SubscriptionResponse::new(subscription, url)
}

fn referral_response(state: &AppState, link: ReferralLink) -> ReferralLinkResponse {
    ReferralLinkResponse {
        referral_url: subscribe_url(&state.config.server.public_base_url, &link.referral_code),
        link,
    }
}

// =============================================================================
// SUBSCRIBER HANDLERS
// =============================================================================

/// Subscribe through a privacy link or referral code
/// POST /api/v1/newsletter/subscribe
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/subscribe",
    tag = "Subscriptions",
    operation_id = "subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscribeResponse),
        (status = 200, description = "Subscription already existed", body = SubscribeResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Unknown link code"),
        (status = 410, description = "Link inactive or referral expired")
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscribeRequest>,
) -> Result<Response, NewsletterError> {
    request.validate()?;

    let outcome = state
        .registry
        .subscribe(SubscribeCommand {
            code: request.code.trim().to_string(),
            email: request.email,
            frequency: request.frequency,
            name: request.name,
        })
        .await?;

    let created = outcome.is_created();
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = SubscribeResponse {
        created,
        subscription: subscription_response(&state, outcome.into_inner()),
    };
    Ok((status, Json(body)).into_response())
}

/// Unsubscribe by subscription code; repeating the call is a no-op
/// POST /api/v1/newsletter/unsubscribe
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/unsubscribe",
    tag = "Subscriptions",
    operation_id = "unsubscribe",
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "Unsubscribed", body = SubscriptionResponse),
        (status = 404, description = "Unknown subscription code")
    )
)]
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<UnsubscribeRequest>,
) -> Result<Json<SubscriptionResponse>, NewsletterError> {
    request.validate()?;
    let subscription = state
        .registry
        .unsubscribe(request.subscription_code.trim())
        .await?;
    Ok(Json(subscription_response(&state, subscription)))
}

/// Change frequency, pause or resume
/// PATCH /api/v1/newsletter/subscriptions/{code}
#[utoipa::path(
    patch,
    path = "/api/v1/newsletter/subscriptions/{code}",
    tag = "Subscriptions",
    operation_id = "updateSubscription",
    params(("code" = String, Path, description = "Subscription code")),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated", body = SubscriptionResponse),
        (status = 400, description = "Nothing to update"),
        (status = 404, description = "Unknown subscription code"),
        (status = 409, description = "Subscription is unsubscribed")
    )
)]
pub async fn update_subscription(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> Result<Json<SubscriptionResponse>, NewsletterError> {
    let changes = SubscriptionChanges {
        frequency: request.frequency,
        status: request.paused.map(|paused| {
            if paused {
                SubscriptionStatus::Paused
            } else {
                SubscriptionStatus::Active
            }
        }),
    };
    let subscription = state.registry.update_subscription(&code, changes).await?;
    Ok(Json(subscription_response(&state, subscription)))
}

/// What a subscribe code points at; does not count a click
/// GET /api/v1/newsletter/links/{code}
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/links/{code}",
    tag = "Links",
    operation_id = "getLinkInfo",
    params(("code" = String, Path, description = "Privacy link or referral code")),
    responses(
        (status = 200, description = "Link information", body = LinkInfoResponse),
        (status = 404, description = "Unknown code")
    )
)]
pub async fn link_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<LinkInfoResponse>, NewsletterError> {
    let target = state.registry.lookup_link(&code).await?;
    let publisher = state
        .store
        .find_publisher(target.user_id())
        .await?
        .ok_or_else(|| NewsletterError::NotFound("Publisher".to_string()))?;

    let info = match &target {
        LinkTarget::Privacy(link) => LinkInfoResponse::for_privacy_link(link, &publisher),
        LinkTarget::Referral(link) => {
            LinkInfoResponse::for_referral_link(link, &publisher, state.clock.now())
        },
    };
    Ok(Json(info))
}

/// Resolve a referral code, counting a click
/// GET /api/v1/newsletter/referrals/{code}
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/referrals/{code}",
    tag = "Referrals",
    operation_id = "resolveReferral",
    params(("code" = String, Path, description = "Referral code")),
    responses(
        (status = 200, description = "Referral metadata", body = ReferralMetadata),
        (status = 404, description = "Unknown referral code"),
        (status = 410, description = "Referral expired or inactive; body carries the metadata")
    )
)]
pub async fn resolve_referral(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ReferralMetadata>, NewsletterError> {
    Ok(Json(state.registry.resolve_referral(&code).await?))
}

// =============================================================================
// PUBLISHER HANDLERS
// =============================================================================

/// Get or create the share link for a tier
/// POST /api/v1/newsletter/privacy-links
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/privacy-links",
    tag = "Links",
    operation_id = "createPrivacyLink",
    request_body = CreatePrivacyLinkRequest,
    responses(
        (status = 200, description = "Active link for the tier", body = PrivacyLinkResponse),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn create_privacy_link(
    State(state): State<AppState>,
    Json(request): Json<CreatePrivacyLinkRequest>,
) -> Result<Json<PrivacyLinkResponse>, NewsletterError> {
    let link = state
        .registry
        .create_privacy_link(request.user_id, request.tier)
        .await?;
    let url = subscribe_url(&state.config.server.public_base_url, &link.link_code);
    Ok(Json(PrivacyLinkResponse::new(link, url)))
}

/// Create a friend-specific referral link
/// POST /api/v1/newsletter/referral-links
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/referral-links",
    tag = "Referrals",
    operation_id = "createReferralLink",
    request_body = CreateReferralLinkRequest,
    responses(
        (status = 201, description = "Referral link created", body = ReferralLinkResponse),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Unknown user")
    )
)]
pub async fn create_referral_link(
    State(state): State<AppState>,
    Json(request): Json<CreateReferralLinkRequest>,
) -> Result<Response, NewsletterError> {
    request.validate()?;

    let link = state
        .registry
        .create_referral_link(ReferralLinkCommand {
            user_id: request.user_id,
            created_by_user_id: request.created_by_user_id.unwrap_or(request.user_id),
            friend_name: request.friend_name,
            friend_email: request.friend_email,
            tier: request.tier,
            expires_at: request.expires_at,
        })
        .await?;

    info!(referral_id = %link.id, "Referral link created via API");
    Ok((StatusCode::CREATED, Json(referral_response(&state, link))).into_response())
}

/// Referral links created by a user, with clicks and conversions
/// GET /api/v1/newsletter/referral-links
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/referral-links",
    tag = "Referrals",
    operation_id = "listReferralLinks",
    params(ReferralLinksQuery),
    responses(
        (status = 200, description = "Referral links", body = [ReferralLinkResponse])
    )
)]
pub async fn list_referral_links(
    State(state): State<AppState>,
    Query(query): Query<ReferralLinksQuery>,
) -> Result<Json<Vec<ReferralLinkResponse>>, NewsletterError> {
    let links = state
        .registry
        .list_referral_links(query.created_by_user_id)
        .await?;
    Ok(Json(
        links
            .into_iter()
            .map(|link| referral_response(&state, link))
            .collect(),
    ))
}

/// Subscriptions to a publisher's newsletter
/// GET /api/v1/newsletter/users/{user_id}/subscriptions
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/users/{user_id}/subscriptions",
    tag = "Subscriptions",
    operation_id = "listSubscriptions",
    params(("user_id" = Uuid, Path, description = "Publisher user ID")),
    responses(
        (status = 200, description = "Subscriptions", body = [SubscriptionResponse]),
        (status = 401, description = "Missing or invalid key")
    ),
    security(("adminKey" = []))
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionResponse>>, NewsletterError> {
    let subscriptions = state.registry.list_subscriptions(user_id).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(|s| subscription_response(&state, s))
            .collect(),
    ))
}

/// Subscribers who joined a publisher's newsletter through a referral link
/// GET /api/v1/newsletter/users/{user_id}/referrals
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/users/{user_id}/referrals",
    tag = "Referrals",
    operation_id = "listReferredSubscriptions",
    params(("user_id" = Uuid, Path, description = "Publisher user ID")),
    responses(
        (status = 200, description = "Referred subscriptions", body = [SubscriptionResponse]),
        (status = 401, description = "Missing or invalid key")
    ),
    security(("adminKey" = []))
)]
pub async fn list_referred_subscriptions(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SubscriptionResponse>>, NewsletterError> {
    let subscriptions = state.registry.list_referred_subscriptions(user_id).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(|s| subscription_response(&state, s))
            .collect(),
    ))
}

/// Compose the digest a tier would receive, without sending it
/// POST /api/v1/newsletter/preview
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/preview",
    tag = "Delivery",
    operation_id = "previewDigest",
    request_body = PreviewRequest,
    responses(
        (status = 200, description = "Composed digest", body = DigestPreview),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Missing or invalid key"),
        (status = 404, description = "Unknown user"),
        (status = 503, description = "Summarizer unavailable")
    ),
    security(("adminKey" = []))
)]
pub async fn preview_digest(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<DigestPreview>, NewsletterError> {
    request.validate()?;
    let preview = state
        .dispatcher
        .preview(
            request.user_id,
            request.tier,
            request.since,
            request.instructions.as_deref(),
        )
        .await?;
    Ok(Json(preview))
}

/// Delivery attempts for a publisher's subscriptions, newest first
/// GET /api/v1/newsletter/users/{user_id}/delivery-log
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/users/{user_id}/delivery-log",
    tag = "Delivery",
    operation_id = "getDeliveryLog",
    params(("user_id" = Uuid, Path, description = "Publisher user ID"), WindowQuery),
    responses(
        (status = 200, description = "Delivery log", body = DeliveryLogResponse),
        (status = 400, description = "Invalid window"),
        (status = 401, description = "Missing or invalid key")
    ),
    security(("adminKey" = []))
)]
pub async fn delivery_log(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<DeliveryLogResponse>, NewsletterError> {
    let window_hours = query.window_hours.unwrap_or(DEFAULT_LOG_WINDOW_HOURS);
    let entries = state.delivery_log.log_for_user(user_id, window_hours).await?;
    Ok(Json(DeliveryLogResponse {
        user_id,
        window_hours,
        entries: entries
            .into_iter()
            .map(DeliveryLogEntryResponse::from)
            .collect(),
    }))
}

// =============================================================================
// ADMIN HANDLERS
// =============================================================================

/// Run one cadence now instead of waiting for the scheduler
/// POST /api/v1/newsletter/admin/send/{frequency}
#[utoipa::path(
    post,
    path = "/api/v1/newsletter/admin/send/{frequency}",
    tag = "Admin",
    operation_id = "triggerSend",
    params(("frequency" = Frequency, Path, description = "daily, weekly or monthly")),
    responses(
        (status = 200, description = "Batch finished", body = BatchReport),
        (status = 401, description = "Missing or invalid admin key")
    ),
    security(("adminKey" = []))
)]
pub async fn trigger_send(
    State(state): State<AppState>,
    Path(frequency): Path<Frequency>,
) -> Result<Json<BatchReport>, NewsletterError> {
    info!(%frequency, "Manual send triggered");
    let report = state
        .dispatcher
        .run_batch(frequency, state.clock.now())
        .await?;
    Ok(Json(report))
}

/// Share of failed attempts for one subscription
/// GET /api/v1/newsletter/admin/subscriptions/{id}/failure-rate
#[utoipa::path(
    get,
    path = "/api/v1/newsletter/admin/subscriptions/{id}/failure-rate",
    tag = "Admin",
    operation_id = "getFailureRate",
    params(("id" = Uuid, Path, description = "Subscription ID"), WindowQuery),
    responses(
        (status = 200, description = "Failure rate", body = FailureRate),
        (status = 401, description = "Missing or invalid admin key"),
        (status = 404, description = "Unknown subscription")
    ),
    security(("adminKey" = []))
)]
pub async fn failure_rate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<FailureRate>, NewsletterError> {
    let window_hours = query.window_hours.unwrap_or(DEFAULT_FAILURE_WINDOW_HOURS);
    Ok(Json(
        state
            .delivery_log
            .recent_failure_rate(id, window_hours)
            .await?,
    ))
}
