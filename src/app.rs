// Application state and bootstrap
use std::sync::Arc;
use tracing::info;

use crate::{
    app_config::{AppConfig, StorageBackend},
    db::{self, DieselDatabaseConfig},
    migrations::{self, MigrationConfig},
    services::{
        composer::{summarizer_from_config, Summarizer},
        email::sender::MailSender,
        Clock, ContentAggregator, DeliveryLogService, DigestComposer, Dispatcher, EmailService,
        SubscriptionRegistry, SystemClock,
    },
    store::{MemoryStore, NewsletterStore, PgNewsletterStore},
};

// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn NewsletterStore>,
    pub clock: Arc<dyn Clock>,
    pub registry: SubscriptionRegistry,
    pub dispatcher: Dispatcher,
    pub delivery_log: DeliveryLogService,
}

impl AppState {
    /// Wires the services around explicit collaborators
    pub fn new(
        config: AppConfig,
        store: Arc<dyn NewsletterStore>,
        clock: Arc<dyn Clock>,
        summarizer: Arc<dyn Summarizer>,
        email: EmailService,
    ) -> Self {
        let aggregator = ContentAggregator::new(store.clone(), config.tier_match_policy);
        let composer =
            DigestComposer::new(summarizer, config.summarizer.default_instructions.clone());
        let dispatcher = Dispatcher::new(
            store.clone(),
            aggregator,
            composer,
            email,
            clock.clone(),
            config.delivery.clone(),
        );

        Self {
            registry: SubscriptionRegistry::new(store.clone(), clock.clone()),
            delivery_log: DeliveryLogService::new(store.clone(), clock.clone()),
            dispatcher,
            config: Arc::new(config),
            store,
            clock,
        }
    }

    /// Same as `new` with a specific mail sender instead of the configured one
    pub fn with_mail_sender(
        config: AppConfig,
        store: Arc<dyn NewsletterStore>,
        clock: Arc<dyn Clock>,
        summarizer: Arc<dyn Summarizer>,
        sender: Arc<dyn MailSender>,
    ) -> Result<Self, crate::services::EmailError> {
        let email = EmailService::new(
            config.email.clone(),
            config.server.public_base_url.clone(),
            sender,
        )?;
        Ok(Self::new(config, store, clock, summarizer, email))
    }
}

/// Builds the state from configuration: storage backend, migrations,
/// mail sender and summarizer
pub async fn initialize_app_state(
    config: &AppConfig,
) -> Result<AppState, Box<dyn std::error::Error + Send + Sync>> {
    let store: Arc<dyn NewsletterStore> = match config.storage_backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage backend");
            Arc::new(MemoryStore::new())
        },
        StorageBackend::Postgres => {
            info!("Initializing database pool...");
            let pool = db::create_diesel_pool(DieselDatabaseConfig::from(&config.database)).await?;

            let migration_config = MigrationConfig::from_app_config(config);
            migrations::run_all_migrations(migration_config)
                .await
                .map_err(|e| format!("Migration failed: {}", e))?;

            Arc::new(PgNewsletterStore::new(pool))
        },
    };

    let email = EmailService::from_config(
        config.email.clone(),
        config.server.public_base_url.clone(),
    )?;
    let summarizer = summarizer_from_config(&config.summarizer);

    Ok(AppState::new(
        config.clone(),
        store,
        Arc::new(SystemClock),
        summarizer,
        email,
    ))
}
