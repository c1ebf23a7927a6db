// Utility modules

pub mod service_error;
pub mod validation;

pub use service_error::NewsletterError;
pub use validation::{normalize_email, preview, trim_optional_field};
