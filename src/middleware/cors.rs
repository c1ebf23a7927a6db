use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, warn};

use crate::app_config::ServerConfig;

/// CORS for the subscribe/manage pages served from another origin.
/// A `*` entry allows any origin outside production; otherwise only the
/// listed origins are allowed.
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600));

    let has_wildcard = server.cors_allowed_origins.iter().any(|o| o == "*");
    let production = server.environment == crate::app_config::Environment::Production;

    if has_wildcard && !production {
        debug!("CORS: allowing any origin");
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_allowed_origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("CORS: ignoring invalid origin {:?}", o);
                None
            },
        })
        .collect();

    debug!("CORS: {} allowed origins", origins.len());
    base.allow_origin(AllowOrigin::list(origins))
}
