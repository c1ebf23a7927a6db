// Common test utilities and helper structs
// Shared across all test files to avoid duplication

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use newsletter_core::{
    app::AppState,
    app_config::{
        AppConfig, DatabaseConfig, DeliveryConfig, EmailConfig, Environment, SchedulerConfig,
        ServerConfig, StorageBackend, SummarizerConfig,
    },
    build_router,
    models::{ContentItem, Frequency, PrivacyLink, Publisher, Subscription, TierMatchPolicy, VisibilityTier},
    services::{
        email::sender::MailSender, Clock, EchoSummarizer, EmailError, EmailMessage, ManualClock,
        SubscribeCommand,
    },
    store::MemoryStore,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;
use uuid::Uuid;

pub const ADMIN_KEY: &str = "test-admin-key-0123456789abcdef0123";
pub const BASE_URL: &str = "https://news.test";

/// Fixed starting instant for deterministic cadence tests
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

/// One scripted response of the test mailer
#[derive(Debug, Clone)]
pub enum MailStep {
    Succeed,
    Fail(EmailError),
    /// Never completes; the dispatcher's timeout must fire
    Hang,
}

/// Mail-send collaborator that follows a script and records every attempt.
/// Once the script is exhausted every send succeeds.
#[derive(Default)]
pub struct ScriptedMailer {
    script: Mutex<VecDeque<MailStep>>,
    attempts: Mutex<Vec<EmailMessage>>,
}

impl ScriptedMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: MailStep) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn fail_times(&self, times: usize) {
        for _ in 0..times {
            self.push(MailStep::Fail(EmailError::ServiceUnavailable));
        }
    }

    pub fn attempts(&self) -> Vec<EmailMessage> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl MailSender for ScriptedMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        self.attempts.lock().unwrap().push(message.clone());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MailStep::Succeed);

        match step {
            MailStep::Succeed => Ok(()),
            MailStep::Fail(e) => Err(e),
            MailStep::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            },
        }
    }
}

/// Configuration for the in-memory backend with fast retries
pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            port: 0,
            environment: Environment::Test,
            rust_log: "debug".to_string(),
            public_base_url: BASE_URL.to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        },
        storage_backend: StorageBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            connect_timeout: 1,
            idle_timeout: 1,
            max_lifetime: 1,
        },
        email: EmailConfig {
            resend_api_key: String::new(),
            resend_api_url: "http://localhost/emails".to_string(),
            from_email: "newsletter@news.test".to_string(),
            from_name: "News Test".to_string(),
        },
        delivery: DeliveryConfig {
            max_attempts: 3,
            retry_delay_ms: 1,
            send_timeout_secs: 5,
            workers: 4,
            content_preview_chars: 200,
        },
        scheduler: SchedulerConfig {
            enabled: false,
            tick_seconds: 3600,
        },
        summarizer: SummarizerConfig {
            url: None,
            api_key: None,
            model: "echo".to_string(),
            timeout_secs: 5,
            default_instructions: "Summarize for friends.".to_string(),
        },
        tier_match_policy: TierMatchPolicy::Cumulative,
        admin_api_key: Some(ADMIN_KEY.to_string()),
        disable_embedded_migrations: true,
    }
}

/// Test application wrapper: the full engine over in-memory collaborators
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<ScriptedMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let mailer = Arc::new(ScriptedMailer::new());

        let state = AppState::with_mail_sender(
            config,
            store.clone(),
            clock.clone(),
            Arc::new(EchoSummarizer),
            mailer.clone(),
        )
        .expect("test state");

        Self {
            app: build_router(state.clone()),
            state,
            store,
            clock,
            mailer,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Inserts a publisher created 30 days before `t0`
    pub async fn publisher(&self, username: &str, full_name: Option<&str>) -> Publisher {
        let publisher = Publisher {
            id: Uuid::new_v4(),
            username: username.to_string(),
            full_name: full_name.map(str::to_string),
            created_at: t0() - chrono::Duration::days(30),
        };
        self.store.insert_publisher(publisher.clone()).await;
        publisher
    }

    pub async fn content(
        &self,
        user_id: Uuid,
        tier: VisibilityTier,
        occurred_at: DateTime<Utc>,
        summary: &str,
    ) -> ContentItem {
        let item = ContentItem {
            id: Uuid::new_v4(),
            user_id,
            tier,
            kind: "life_event".to_string(),
            summary: summary.to_string(),
            occurred_at,
            created_at: occurred_at,
        };
        self.store.insert_content(item.clone()).await;
        item
    }

    pub async fn privacy_link(&self, user_id: Uuid, tier: VisibilityTier) -> PrivacyLink {
        self.state
            .registry
            .create_privacy_link(user_id, tier)
            .await
            .expect("privacy link")
    }

    /// Subscribes `email` through a fresh or reused privacy link
    pub async fn subscriber(
        &self,
        user_id: Uuid,
        tier: VisibilityTier,
        email: &str,
        frequency: Frequency,
    ) -> Subscription {
        let link = self.privacy_link(user_id, tier).await;
        self.state
            .registry
            .subscribe(SubscribeCommand {
                code: link.link_code,
                email: email.to_string(),
                frequency,
                name: None,
            })
            .await
            .expect("subscribe")
            .into_inner()
    }

    pub fn post(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "POST", uri)
    }

    pub fn get(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "GET", uri)
    }

    pub fn patch(&self, uri: &str) -> TestRequest {
        TestRequest::new(self, "PATCH", uri)
    }
}

/// Test request builder
pub struct TestRequest<'a> {
    app: &'a TestApp,
    method: &'static str,
    uri: String,
    body: Option<Vec<u8>>,
    bearer: Option<String>,
}

impl<'a> TestRequest<'a> {
    fn new(app: &'a TestApp, method: &'static str, uri: &str) -> Self {
        Self {
            app,
            method,
            uri: uri.to_string(),
            body: None,
            bearer: None,
        }
    }

    /// Add JSON body to request
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        self.body = Some(serde_json::to_vec(body).unwrap());
        self
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn admin(self) -> Self {
        self.bearer(ADMIN_KEY)
    }

    /// Send the request
    pub async fn send(self) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(&self.uri);
        if let Some(token) = &self.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match self.body {
            Some(bytes) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(bytes))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.app.clone().oneshot(request).await.unwrap();
        TestResponse { response }
    }
}

/// Test response wrapper
pub struct TestResponse {
    response: Response<Body>,
}

impl TestResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Parse JSON response
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> T {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    pub async fn text(self) -> String {
        let body = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }
}
