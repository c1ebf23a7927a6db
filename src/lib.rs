// Library exports for the newsletter engine
// This file exposes modules and the router builder for the binary and tests

pub mod app;
pub mod app_config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod migrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use app::{initialize_app_state, AppState};
pub use app_config::{AppConfig, CONFIG};
pub use db::{DieselDatabaseConfig, DieselPool};
pub use services::{Dispatcher, EmailService, Scheduler, SubscriptionRegistry};
pub use store::{MemoryStore, NewsletterStore, PgNewsletterStore, StoreError};
pub use utils::NewsletterError;

// Re-export handler route builders
pub use handlers::newsletter_routes;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

/// Complete HTTP application: API, health and OpenAPI document
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api-docs/openapi.json", get(handlers::docs::serve_openapi_spec))
        .nest("/api/v1/newsletter", newsletter_routes(state.clone()))
        .layer(middleware::cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Health check handler
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    use axum::http::StatusCode;
    use axum::Json;

    let timestamp = state.clock.now().to_rfc3339();
    let backend = match state.config.storage_backend {
        app_config::StorageBackend::Postgres => "postgresql",
        app_config::StorageBackend::Memory => "memory",
    };

    let (healthy, storage) = match state.store.health_check().await {
        Ok(()) => (
            true,
            serde_json::json!({
                "backend": backend,
                "status": "healthy",
                "error": null
            }),
        ),
        Err(e) => {
            tracing::warn!("Storage health check failed: {}", e);
            (
                false,
                serde_json::json!({
                    "backend": backend,
                    "status": "unhealthy",
                    "error": format!("Storage check failed: {}", e)
                }),
            )
        },
    };

    let response = serde_json::json!({
        "status": if healthy { "healthy" } else { "degraded" },
        "service": "newsletter-core",
        "timestamp": timestamp,
        "components": {
            "storage": storage,
            "scheduler": {
                "enabled": state.config.scheduler.enabled,
                "tick_seconds": state.config.scheduler.tick_seconds
            }
        }
    });

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
