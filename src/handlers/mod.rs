// HTTP handlers for the newsletter API

pub mod docs;
pub mod newsletter;

use crate::{app::AppState, middleware::require_admin_key};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

// Newsletter routes, mounted under /api/v1/newsletter
pub fn newsletter_routes(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/send/{frequency}", post(newsletter::trigger_send))
        .route(
            "/subscriptions/{id}/failure-rate",
            get(newsletter::failure_rate),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    // Subscriber data and unsent digests: only the trusted backend holding the key
    let publisher = Router::new()
        .route(
            "/users/{user_id}/subscriptions",
            get(newsletter::list_subscriptions),
        )
        .route(
            "/users/{user_id}/referrals",
            get(newsletter::list_referred_subscriptions),
        )
        .route(
            "/users/{user_id}/delivery-log",
            get(newsletter::delivery_log),
        )
        .route("/preview", post(newsletter::preview_digest))
        .route_layer(middleware::from_fn_with_state(state, require_admin_key));

    Router::new()
        .route("/subscribe", post(newsletter::subscribe))
        .route("/unsubscribe", post(newsletter::unsubscribe))
        .route(
            "/subscriptions/{code}",
            patch(newsletter::update_subscription),
        )
        .route("/links/{code}", get(newsletter::link_info))
        .route("/privacy-links", post(newsletter::create_privacy_link))
        .route(
            "/referral-links",
            post(newsletter::create_referral_link).get(newsletter::list_referral_links),
        )
        .route("/referrals/{code}", get(newsletter::resolve_referral))
        .merge(publisher)
        .nest("/admin", admin)
}
