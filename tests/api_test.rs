// HTTP surface: status codes and bodies of the newsletter API

mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::{t0, TestApp, BASE_URL};
use newsletter_core::models::{Frequency, VisibilityTier};
use serde_json::{json, Value};

#[tokio::test]
async fn test_health_and_openapi() {
    let app = TestApp::new();

    let response = app.get("/health").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["components"]["storage"]["backend"], "memory");

    let response = app.get("/api-docs/openapi.json").send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let doc: Value = response.json().await;
    assert!(doc["paths"]["/api/v1/newsletter/subscribe"].is_object());
}

#[tokio::test]
async fn test_privacy_link_is_reused_per_tier() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;

    let first: Value = app
        .post("/api/v1/newsletter/privacy-links")
        .json(&json!({ "user_id": ada.id, "tier": "good_friends" }))
        .send()
        .await
        .json()
        .await;
    let second: Value = app
        .post("/api/v1/newsletter/privacy-links")
        .json(&json!({ "user_id": ada.id, "tier": "good_friends" }))
        .send()
        .await
        .json()
        .await;

    let code = first["link_code"].as_str().unwrap();
    assert_eq!(second["link_code"], code);
    assert_eq!(
        first["subscribe_url"],
        format!("{}/subscribe/{}", BASE_URL, code)
    );
}

#[tokio::test]
async fn test_subscribe_created_then_existing() {
    let app = TestApp::new();
    let ada = app.publisher("ada", Some("Ada Lovelace")).await;
    let link = app.privacy_link(ada.id, VisibilityTier::Public).await;
    let request = json!({
        "code": link.link_code,
        "email": "Reader@Example.com",
        "frequency": "weekly"
    });

    let response = app.post("/api/v1/newsletter/subscribe").json(&request).send().await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: Value = response.json().await;
    assert_eq!(created["created"], true);
    assert_eq!(created["subscription"]["subscriber_email"], "reader@example.com");
    assert_eq!(created["subscription"]["frequency"], "weekly");
    assert_eq!(created["subscription"]["tier"], "public");

    let response = app.post("/api/v1/newsletter/subscribe").json(&request).send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let existing: Value = response.json().await;
    assert_eq!(existing["created"], false);
    assert_eq!(existing["subscription"]["id"], created["subscription"]["id"]);
}

#[tokio::test]
async fn test_subscribe_rejects_bad_input() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    let link = app.privacy_link(ada.id, VisibilityTier::Public).await;

    let response = app
        .post("/api/v1/newsletter/subscribe")
        .json(&json!({ "code": link.link_code, "email": "not-an-email", "frequency": "daily" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await;
    assert_eq!(body["code"], "validation_error");

    let response = app
        .post("/api/v1/newsletter/subscribe")
        .json(&json!({ "code": "nosuchcode", "email": "a@example.com", "frequency": "daily" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await;
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn test_link_info_describes_the_code() {
    let app = TestApp::new();
    let ada = app.publisher("ada", Some("Ada Lovelace")).await;
    let link = app.privacy_link(ada.id, VisibilityTier::BestFriends).await;

    let response = app
        .get(&format!("/api/v1/newsletter/links/{}", link.link_code))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let info: Value = response.json().await;
    assert_eq!(info["kind"], "privacy");
    assert_eq!(info["publisher_name"], "Ada Lovelace");
    assert_eq!(info["tier_label"], "Best friends");
    assert_eq!(info["is_active"], true);

    let response = app.get("/api/v1/newsletter/links/unknown123").send().await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsubscribe_pause_and_terminal_state() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    let sub = app
        .subscriber(ada.id, VisibilityTier::Public, "reader@example.com", Frequency::Daily)
        .await;
    let path = format!("/api/v1/newsletter/subscriptions/{}", sub.subscription_code);

    let response = app.patch(&path).json(&json!({ "paused": true })).send().await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await;
    assert_eq!(body["status"], "paused");

    let response = app
        .patch(&path)
        .json(&json!({ "paused": false, "frequency": "monthly" }))
        .send()
        .await;
    let body: Value = response.json().await;
    assert_eq!(body["status"], "active");
    assert_eq!(body["frequency"], "monthly");

    let response = app.patch(&path).json(&json!({})).send().await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for _ in 0..2 {
        let response = app
            .post("/api/v1/newsletter/unsubscribe")
            .json(&json!({ "subscription_code": sub.subscription_code }))
            .send()
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await;
        assert_eq!(body["status"], "unsubscribed");
    }

    let response = app.patch(&path).json(&json!({ "paused": false })).send().await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await;
    assert_eq!(body["code"], "invalid_transition");
}

#[tokio::test]
async fn test_referral_lifecycle() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;

    let response = app
        .post("/api/v1/newsletter/referral-links")
        .json(&json!({
            "user_id": ada.id,
            "friend_name": "Grace",
            "friend_email": "grace@example.com",
            "tier": "best_friends",
            "expires_at": t0() + Duration::hours(1)
        }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let link: Value = response.json().await;
    let code = link["referral_code"].as_str().unwrap().to_string();
    assert_eq!(link["referral_url"], format!("{}/subscribe/{}", BASE_URL, code));
    assert_eq!(link["created_by_user_id"], json!(ada.id));

    let response = app
        .get(&format!("/api/v1/newsletter/referrals/{}", code))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let meta: Value = response.json().await;
    assert_eq!(meta["friend_name"], "Grace");
    assert_eq!(meta["clicks"], 1);

    let listed: Vec<Value> = app
        .get(&format!(
            "/api/v1/newsletter/referral-links?created_by_user_id={}",
            ada.id
        ))
        .send()
        .await
        .json()
        .await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["referral_code"], code);

    app.clock.advance(Duration::hours(2));
    let response = app
        .get(&format!("/api/v1/newsletter/referrals/{}", code))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::GONE);
    let body: Value = response.json().await;
    assert_eq!(body["code"], "referral_expired");
    assert_eq!(body["referral"]["friend_name"], "Grace");
    assert_eq!(body["referral"]["clicks"], 2);
}

#[tokio::test]
async fn test_referral_link_rejects_blank_friend_name() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;

    let response = app
        .post("/api/v1/newsletter/referral-links")
        .json(&json!({ "user_id": ada.id, "friend_name": "", "tier": "public" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_send_requires_key() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.content(ada.id, VisibilityTier::Public, t0() - Duration::hours(1), "news")
        .await;
    app.subscriber(ada.id, VisibilityTier::Public, "reader@example.com", Frequency::Daily)
        .await;

    let response = app.post("/api/v1/newsletter/admin/send/daily").send().await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .post("/api/v1/newsletter/admin/send/daily")
        .bearer("wrong-key")
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.mailer.attempt_count(), 0);

    let response = app
        .post("/api/v1/newsletter/admin/send/daily")
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report: Value = response.json().await;
    assert_eq!(report["due"], 1);
    assert_eq!(report["committed"], 1);
}

#[tokio::test]
async fn test_delivery_log_and_failure_rate() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.content(ada.id, VisibilityTier::Public, t0() - Duration::hours(1), "news")
        .await;
    let sub = app
        .subscriber(ada.id, VisibilityTier::Public, "reader@example.com", Frequency::Daily)
        .await;
    app.mailer.fail_times(1);

    app.post("/api/v1/newsletter/admin/send/daily")
        .admin()
        .send()
        .await;

    let log: Value = app
        .get(&format!("/api/v1/newsletter/users/{}/delivery-log", ada.id))
        .admin()
        .send()
        .await
        .json()
        .await;
    assert_eq!(log["window_hours"], 168);
    assert_eq!(log["entries"].as_array().unwrap().len(), 2);

    let response = app
        .get(&format!(
            "/api/v1/newsletter/admin/subscriptions/{}/failure-rate?window_hours=24",
            sub.id
        ))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rate: Value = response.json().await;
    assert_eq!(rate["total"], 2);
    assert_eq!(rate["failed"], 1);
    assert_eq!(rate["rate"], 0.5);

    let response = app
        .get(&format!(
            "/api/v1/newsletter/users/{}/delivery-log?window_hours=0",
            ada.id
        ))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_window_is_a_bad_request() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    let sub = app
        .subscriber(ada.id, VisibilityTier::Public, "reader@example.com", Frequency::Daily)
        .await;

    let response = app
        .get(&format!(
            "/api/v1/newsletter/users/{}/delivery-log?window_hours=10000000000",
            ada.id
        ))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await;
    assert_eq!(body["code"], "validation_error");

    let response = app
        .get(&format!(
            "/api/v1/newsletter/admin/subscriptions/{}/failure-rate?window_hours=10000000000",
            sub.id
        ))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_subscriptions_for_publisher() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.subscriber(ada.id, VisibilityTier::Public, "a@example.com", Frequency::Daily)
        .await;
    app.subscriber(ada.id, VisibilityTier::GoodFriends, "b@example.com", Frequency::Weekly)
        .await;

    let response = app
        .get(&format!("/api/v1/newsletter/users/{}/subscriptions", ada.id))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let subs: Vec<Value> = response.json().await;
    assert_eq!(subs.len(), 2);
    assert!(subs
        .iter()
        .all(|s| s["unsubscribe_url"].as_str().unwrap().starts_with(BASE_URL)));
}

#[tokio::test]
async fn test_subscriber_data_requires_key() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.subscriber(ada.id, VisibilityTier::Public, "a@example.com", Frequency::Daily)
        .await;

    for path in ["subscriptions", "referrals", "delivery-log"] {
        let uri = format!("/api/v1/newsletter/users/{}/{}", ada.id, path);
        let response = app.get(&uri).send().await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        let body: Value = response.json().await;
        assert_eq!(body["code"], "unauthorized");

        let response = app.get(&uri).bearer("wrong-key").send().await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let response = app
        .post("/api/v1/newsletter/preview")
        .json(&json!({ "user_id": ada.id, "tier": "public" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_referred_subscribers_for_publisher() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.subscriber(ada.id, VisibilityTier::Public, "direct@example.com", Frequency::Daily)
        .await;

    let link: Value = app
        .post("/api/v1/newsletter/referral-links")
        .json(&json!({ "user_id": ada.id, "friend_name": "Grace", "tier": "best_friends" }))
        .send()
        .await
        .json()
        .await;
    let code = link["referral_code"].as_str().unwrap();
    let response = app
        .post("/api/v1/newsletter/subscribe")
        .json(&json!({ "code": code, "email": "grace@example.com", "frequency": "weekly" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .get(&format!("/api/v1/newsletter/users/{}/referrals", ada.id))
        .admin()
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let referred: Vec<Value> = response.json().await;
    assert_eq!(referred.len(), 1);
    assert_eq!(referred[0]["subscriber_email"], "grace@example.com");
    assert_eq!(referred[0]["referral_code"], code);
    assert_eq!(referred[0]["referred_by"], link["id"]);
    assert_eq!(referred[0]["tier"], "best_friends");
}

#[tokio::test]
async fn test_preview_composes_without_sending() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;
    app.content(ada.id, VisibilityTier::Public, t0() - Duration::hours(2), "Ran a marathon")
        .await;
    app.content(ada.id, VisibilityTier::CloseFamily, t0() - Duration::hours(1), "Family dinner")
        .await;
    app.subscriber(ada.id, VisibilityTier::Public, "reader@example.com", Frequency::Daily)
        .await;

    let response = app
        .post("/api/v1/newsletter/preview")
        .admin()
        .json(&json!({
            "user_id": ada.id,
            "tier": "public",
            "since": t0() - Duration::days(1),
            "instructions": "Keep it short."
        }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let preview: Value = response.json().await;
    assert_eq!(preview["item_count"], 1);
    assert_eq!(preview["tier"], "public");
    let content = preview["content"].as_str().unwrap();
    assert!(content.contains("Ran a marathon"));
    assert!(!content.contains("Family dinner"));

    assert_eq!(app.mailer.attempt_count(), 0);
    assert!(app.store.all_delivery_log().await.is_empty());

    // Nothing in the window: no content, still a success
    let quiet: Value = app
        .post("/api/v1/newsletter/preview")
        .admin()
        .json(&json!({ "user_id": ada.id, "tier": "public", "since": t0() - Duration::minutes(30) }))
        .send()
        .await
        .json()
        .await;
    assert_eq!(quiet["item_count"], 0);
    assert!(quiet["content"].is_null());
}

#[tokio::test]
async fn test_preview_rejects_bad_input() {
    let app = TestApp::new();
    let ada = app.publisher("ada", None).await;

    let response = app
        .post("/api/v1/newsletter/preview")
        .admin()
        .json(&json!({ "user_id": ada.id, "tier": "public", "since": t0() + Duration::hours(1) }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post("/api/v1/newsletter/preview")
        .admin()
        .json(&json!({ "user_id": ada.id, "tier": "public", "instructions": "x".repeat(2001) }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post("/api/v1/newsletter/preview")
        .admin()
        .json(&json!({ "user_id": uuid::Uuid::new_v4(), "tier": "public" }))
        .send()
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
