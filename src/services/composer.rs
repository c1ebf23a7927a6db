// Digest composer: turns aggregated content into prose through a swappable summarizer

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::app_config::SummarizerConfig;
use crate::models::{ContentItem, VisibilityTier};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummarizeError {
    #[error("Summarizer request failed: {0}")]
    Request(String),

    #[error("Summarizer returned status {0}")]
    Status(u16),

    #[error("Summarizer response was malformed: {0}")]
    InvalidResponse(String),

    #[error("Summarizer returned no text")]
    Empty,
}

/// `Summarize(items, instructions) -> text`, pure from the engine's point of view
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        items: &[ContentItem],
        instructions: &str,
    ) -> Result<String, SummarizeError>;
}

/// Deterministic summarizer that lists the items it was given
#[derive(Debug, Default, Clone)]
pub struct EchoSummarizer;

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(
        &self,
        items: &[ContentItem],
        _instructions: &str,
    ) -> Result<String, SummarizeError> {
        Ok(items
            .iter()
            .map(|item| {
                format!(
                    "{} ({}): {}",
                    item.occurred_at.format("%B %d, %Y"),
                    item.kind,
                    item.summary.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Summarizer backed by an OpenAI-compatible chat completions endpoint
pub struct HttpSummarizer {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpSummarizer {
    pub fn new(url: String, api_key: Option<String>, model: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("newsletter-core/0.1")
            .build()
            .unwrap_or_default();

        Self {
            client,
            url,
            api_key,
            model,
        }
    }

    fn prompt(items: &[ContentItem], instructions: &str) -> String {
        let events = items
            .iter()
            .map(|item| format!("- {}: {}", item.occurred_at.format("%Y-%m-%d"), item.summary))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Instructions: {}\n\nLife events in this period:\n{}",
            instructions, events
        )
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    #[instrument(skip(self, items, instructions), fields(items = items.len()))]
    async fn summarize(
        &self,
        items: &[ContentItem],
        instructions: &str,
    ) -> Result<String, SummarizeError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You write short, warm personal newsletters in plain paragraphs."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: Self::prompt(items, instructions),
                },
            ],
            max_tokens: 2000,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| SummarizeError::Request(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Summarizer returned {}", response.status());
            return Err(SummarizeError::Status(response.status().as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| SummarizeError::InvalidResponse(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(SummarizeError::Empty)
    }
}

/// Builds the summarizer selected by configuration
pub fn summarizer_from_config(config: &SummarizerConfig) -> Arc<dyn Summarizer> {
    match &config.url {
        Some(url) => Arc::new(HttpSummarizer::new(
            url.clone(),
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )),
        None => Arc::new(EchoSummarizer),
    }
}

#[derive(Clone)]
pub struct DigestComposer {
    summarizer: Arc<dyn Summarizer>,
    default_instructions: String,
}

impl DigestComposer {
    pub fn new(summarizer: Arc<dyn Summarizer>, default_instructions: String) -> Self {
        Self {
            summarizer,
            default_instructions,
        }
    }

    /// `Compose(items, tier, instructions) -> text`. Errors are recoverable;
    /// the caller decides whether to send at all when `items` is empty.
    pub async fn compose(
        &self,
        items: &[ContentItem],
        tier: &VisibilityTier,
        instructions: Option<&str>,
    ) -> Result<String, SummarizeError> {
        let instructions = instructions
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .unwrap_or(&self.default_instructions);
        let instructions = format!(
            "{} Audience: {} (tier rank {}).",
            instructions,
            tier.label(),
            tier.rank()
        );

        let text = self.summarizer.summarize(items, &instructions).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizeError::Empty);
        }

        debug!(items = items.len(), chars = text.len(), "Digest composed");
        Ok(text.to_string())
    }
}
