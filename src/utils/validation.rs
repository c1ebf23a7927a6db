// Validation utilities for string fields

/// Trim and optionally validate a string field
///
/// Returns `None` if the field is missing or empty after trimming.
pub fn trim_optional_field(field: Option<&String>) -> Option<String> {
    field.and_then(|s| {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Canonical form used for the subscription uniqueness key
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Truncates on a character boundary
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
