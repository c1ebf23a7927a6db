// Middleware modules for the newsletter API

pub mod admin;
pub mod cors;

pub use admin::require_admin_key;
pub use cors::cors_layer;
