// Email Builders - each builder knows how to construct its specific email type

use super::types::{EmailBuilder, EmailError, EmailMessage, NewsletterDigestData};
use crate::app_config::EmailConfig;
use crate::models::{Publisher, Subscription};
use handlebars::Handlebars;
use tracing::instrument;

/// Builder for one subscriber's digest email
pub struct NewsletterDigestEmailBuilder<'a> {
    subscription: &'a Subscription,
    publisher: &'a Publisher,
    digest: &'a str,
    item_count: usize,
    public_base_url: &'a str,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> NewsletterDigestEmailBuilder<'a> {
    pub fn new(
        subscription: &'a Subscription,
        publisher: &'a Publisher,
        digest: &'a str,
        item_count: usize,
        public_base_url: &'a str,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            subscription,
            publisher,
            digest,
            item_count,
            public_base_url,
            config,
            templates,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "{} update from {}",
            self.subscription.frequency.title(),
            self.publisher.display_name()
        )
    }

    pub fn unsubscribe_url(&self) -> String {
        unsubscribe_url(self.public_base_url, &self.subscription.subscription_code)
    }
}

pub fn unsubscribe_url(public_base_url: &str, subscription_code: &str) -> String {
    format!("{}/unsubscribe/{}", public_base_url, subscription_code)
}

/// Shareable entry point for both privacy and referral codes
pub fn subscribe_url(public_base_url: &str, link_code: &str) -> String {
    format!("{}/subscribe/{}", public_base_url, link_code)
}

impl<'a> EmailBuilder for NewsletterDigestEmailBuilder<'a> {
    #[instrument(skip(self), fields(subscription_id = %self.subscription.id))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        let unsubscribe_url = self.unsubscribe_url();
        let publisher_name = self.publisher.display_name().to_string();

        let data = NewsletterDigestData {
            subscriber_name: self.subscription.subscriber_name.clone(),
            publisher_name: publisher_name.clone(),
            frequency: self.subscription.frequency.as_str().to_string(),
            tier_label: self.subscription.tier.label().to_lowercase(),
            paragraphs: self
                .digest
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            item_count: self.item_count,
            unsubscribe_url: unsubscribe_url.clone(),
            app_name: self.config.from_name.clone(),
        };

        let html = self
            .templates
            .render("newsletter_digest", &data)
            .map_err(|e| EmailError::TemplateError(e.to_string()))?;

        let greeting = match &self.subscription.subscriber_name {
            Some(name) => format!("Hi {},\n\n", name),
            None => String::new(),
        };
        let text = format!(
            "{}What's new with {}\n\n{}\n\n---\nUnsubscribe: {}",
            greeting, publisher_name, self.digest, unsubscribe_url
        );

        Ok(EmailMessage::new(
            format!("{} <{}>", self.config.from_name, self.config.from_email),
            vec![self.subscription.subscriber_email.clone()],
            self.subject(),
            html,
        )
        .with_text(text))
    }
}
