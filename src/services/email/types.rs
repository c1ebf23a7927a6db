// Email Service Types - Shared types and structures for email module

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during email operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    SendError(String),

    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// The provider accepted the request but permanently rejected the recipient
    #[error("Recipient rejected: {0}")]
    Bounced(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Send timed out after {0}s")]
    Timeout(u64),
}

impl EmailError {
    /// Retrying cannot help; the recipient is unreachable
    pub fn is_bounce(&self) -> bool {
        matches!(self, EmailError::Bounced(_))
    }
}

/// Generic email message structure that can be sent
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: Option<String>,
}

impl EmailMessage {
    pub fn new(from: String, to: Vec<String>, subject: String, html: String) -> Self {
        Self {
            from,
            to,
            subject,
            html,
            text: None,
        }
    }

    pub fn with_text(mut self, text: String) -> Self {
        self.text = Some(text);
        self
    }
}

/// Trait that all email builders must implement
pub trait EmailBuilder {
    fn build(&self) -> Result<EmailMessage, EmailError>;
}

/// Data structure for the newsletter digest template
#[derive(Debug, Serialize)]
pub struct NewsletterDigestData {
    pub subscriber_name: Option<String>,
    pub publisher_name: String,
    pub frequency: String,
    pub tier_label: String,
    pub paragraphs: Vec<String>,
    pub item_count: usize,
    pub unsubscribe_url: String,
    pub app_name: String,
}

/// Resend API specific email format.
/// Optional fields are omitted from the JSON payload when `None`.
#[derive(Debug, Serialize)]
pub struct ResendEmailPayload {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<EmailMessage> for ResendEmailPayload {
    fn from(message: EmailMessage) -> Self {
        Self {
            from: message.from,
            to: message.to,
            subject: message.subject,
            html: message.html,
            text: message.text,
        }
    }
}
