// Email Sender - the mail-send collaborator
// Implementations make exactly one delivery attempt; retry policy belongs to the dispatcher.

use super::types::{EmailError, EmailMessage, ResendEmailPayload};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

#[async_trait]
pub trait MailSender: Send + Sync {
    /// One delivery attempt; no ordering or deduplication guarantees
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Error body returned by Resend on a rejected request
#[derive(Debug, Default, Deserialize)]
struct ResendErrorBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    message: String,
}

impl ResendErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Rejections aimed at the recipient address rather than the request itself
    fn rejects_recipient(&self) -> bool {
        let message = self.message.to_lowercase();
        match self.name.as_str() {
            "invalid_to_address" => true,
            "validation_error" | "invalid_parameter" => {
                message.contains("`to`") || message.contains("recipient")
            },
            _ => false,
        }
    }
}

/// Sends through the Resend HTTP API
#[derive(Clone)]
pub struct ResendMailSender {
    client: Arc<Client>,
    api_key: String,
    api_url: String,
}

impl ResendMailSender {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            client: Arc::new(Client::new()),
            api_key,
            api_url,
        }
    }

    /// Maps a non-success provider status to the error taxonomy.
    /// Only a rejected recipient is a bounce; other 4xx responses are send errors.
    pub fn classify_status(status: StatusCode, body: &str) -> EmailError {
        match status.as_u16() {
            429 => EmailError::RateLimitExceeded,
            400 | 422 => {
                let error = ResendErrorBody::parse(body);
                if error.rejects_recipient() {
                    EmailError::Bounced(error.message)
                } else {
                    EmailError::SendError(format!(
                        "Email rejected with status {}: {}",
                        status, body
                    ))
                }
            },
            s if (500..600).contains(&s) => EmailError::ServiceUnavailable,
            _ => EmailError::SendError(format!(
                "Email send failed with status {}: {}",
                status, body
            )),
        }
    }
}

#[async_trait]
impl MailSender for ResendMailSender {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let payload: ResendEmailPayload = message.clone().into();

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                info!("Email sent successfully");
                Ok(())
            },
            Ok(res) => {
                let status = res.status();
                let error_text = res
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                error!(
                    "Failed to send email. Status: {}, Error: {}",
                    status, error_text
                );
                Err(Self::classify_status(status, &error_text))
            },
            Err(e) => {
                error!("Network error while sending email: {:?}", e);
                Err(EmailError::SendError(format!("Network error: {}", e)))
            },
        }
    }
}

/// Development mailer: logs the message instead of sending it
#[derive(Debug, Default, Clone)]
pub struct LogOnlyMailSender;

#[async_trait]
impl MailSender for LogOnlyMailSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let preview: String = message
            .text
            .as_deref()
            .unwrap_or(&message.html)
            .chars()
            .take(200)
            .collect();
        info!(
            to = ?message.to,
            subject = %message.subject,
            "Mock email sent (no RESEND_API_KEY configured): {}",
            preview
        );
        Ok(())
    }
}
