// Email Service Module
// Coordinates digest builders with the mail-send collaborator

pub mod builders;
pub mod sender;
pub mod types;

use self::types::EmailBuilder;
use crate::app_config::EmailConfig;
use crate::models::{Publisher, Subscription};
use builders::NewsletterDigestEmailBuilder;
use handlebars::Handlebars;
use sender::{LogOnlyMailSender, MailSender, ResendMailSender};
use std::sync::Arc;
use tracing::{info, instrument};

/// Renders digests and hands them to the configured mail sender
#[derive(Clone)]
pub struct EmailService {
    sender: Arc<dyn MailSender>,
    config: EmailConfig,
    public_base_url: String,
    templates: Arc<Handlebars<'static>>,
}

impl EmailService {
    pub fn new(
        config: EmailConfig,
        public_base_url: String,
        sender: Arc<dyn MailSender>,
    ) -> Result<Self, EmailError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(false);
        Self::register_templates(&mut templates)?;

        Ok(Self {
            sender,
            config,
            public_base_url,
            templates: Arc::new(templates),
        })
    }

    /// Picks Resend when an API key is configured, the log-only sender otherwise
    pub fn from_config(config: EmailConfig, public_base_url: String) -> Result<Self, EmailError> {
        let sender: Arc<dyn MailSender> = if config.resend_api_key.trim().is_empty() {
            info!("RESEND_API_KEY not set, newsletters will be logged instead of sent");
            Arc::new(LogOnlyMailSender)
        } else {
            Arc::new(ResendMailSender::new(
                config.resend_api_key.clone(),
                config.resend_api_url.clone(),
            ))
        };
        Self::new(config, public_base_url, sender)
    }

    fn register_templates(templates: &mut Handlebars) -> Result<(), EmailError> {
        let digest_template = include_str!("../../templates/email/newsletter_digest.html");
        templates
            .register_template_string("newsletter_digest", digest_template)
            .map_err(|e| EmailError::TemplateError(e.to_string()))?;

        Ok(())
    }

    /// Renders the digest email for one subscription
    pub fn build_digest(
        &self,
        subscription: &Subscription,
        publisher: &Publisher,
        digest: &str,
        item_count: usize,
    ) -> Result<EmailMessage, EmailError> {
        NewsletterDigestEmailBuilder::new(
            subscription,
            publisher,
            digest,
            item_count,
            &self.public_base_url,
            &self.config,
            &self.templates,
        )
        .build()
    }

    /// One delivery attempt through the mail-send collaborator
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    pub async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.sender.send(message).await
    }

    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }
}

pub use types::{EmailError, EmailMessage};
