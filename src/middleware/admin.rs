// Key authentication for operator and publisher-data endpoints
// Validates `Authorization: Bearer <ADMIN_API_KEY>` in constant time

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::{app::AppState, utils::NewsletterError};

/// Constant-time check of a presented key against the configured one
pub fn admin_key_matches(configured: &str, presented: &str) -> bool {
    configured.as_bytes().ct_eq(presented.as_bytes()).into()
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Rejects the request unless it carries the admin key. With no key
/// configured, every protected endpoint is closed.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(configured) = state.config.admin_api_key.as_deref() else {
        warn!("Protected endpoint called but ADMIN_API_KEY is not configured");
        return NewsletterError::Unauthorized.into_response();
    };

    match bearer_token(&request) {
        Some(token) if admin_key_matches(configured, token) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected request without a valid key");
            NewsletterError::Unauthorized.into_response()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_key_comparison() {
        assert!(admin_key_matches("secret-key", "secret-key"));
        assert!(!admin_key_matches("secret-key", "secret-kez"));
        assert!(!admin_key_matches("secret-key", "secret"));
        assert!(!admin_key_matches("secret-key", ""));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&request), Some("abc123"));

        let basic = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&basic), None);
    }
}
