// Centralized configuration management for the newsletter engine
// Load ALL env vars ONCE at startup, hand each component its own section

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::models::visibility::TierMatchPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Global application configuration loaded once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    #[cfg(test)]
    dotenv::dotenv().ok();

    AppConfig::from_env().expect("Failed to load configuration")
});

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage_backend: StorageBackend,
    pub database: DatabaseConfig,
    pub email: EmailConfig,
    pub delivery: DeliveryConfig,
    pub scheduler: SchedulerConfig,
    pub summarizer: SummarizerConfig,
    pub tier_match_policy: TierMatchPolicy,
    pub admin_api_key: Option<String>,
    pub disable_embedded_migrations: bool,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub environment: Environment,
    pub rust_log: String,
    /// Base URL used for subscribe/unsubscribe links in emails and API responses
    pub public_base_url: String,
    /// Browser origins allowed to call the API; `*` allows any
    pub cors_allowed_origins: Vec<String>,
}

/// Environment type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Test,
    Staging,
    Production,
}

impl From<String> for Environment {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Environment::Development,
            "test" => Environment::Test,
            "staging" | "stage" => Environment::Staging,
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which storage collaborator backs the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl From<String> for StorageBackend {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => StorageBackend::Memory,
            _ => StorageBackend::Postgres,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub max_lifetime: u64,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// Empty key selects the log-only mailer
    pub resend_api_key: String,
    pub resend_api_url: String,
    pub from_email: String,
    pub from_name: String,
}

/// Dispatcher delivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub send_timeout_secs: u64,
    pub workers: usize,
    pub content_preview_chars: usize,
}

impl DeliveryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
            send_timeout_secs: 30,
            workers: 8,
            content_preview_chars: 200,
        }
    }
}

/// Scheduler loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub tick_seconds: u64,
}

/// Summarization collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    /// No URL selects the deterministic echo summarizer
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub default_instructions: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let get_required = |key: &str| -> Result<String, ConfigError> {
            env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
        };

        let get_or_default = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let get_optional = |key: &str| -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        };

        let parse_u32_or_default = |key: &str, default: &str| -> Result<u32, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u32".to_string())
            })
        };

        let parse_u64_or_default = |key: &str, default: &str| -> Result<u64, ConfigError> {
            get_or_default(key, default).parse().map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "not a valid u64".to_string())
            })
        };

        let parse_bool_or_default = |key: &str, default: &str| -> bool {
            get_or_default(key, default).to_lowercase() == "true"
        };

        let bind_address = get_or_default("BIND_ADDRESS", "0.0.0.0:8080");
        let port = bind_address
            .rsplit(':')
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let environment = Environment::from(get_or_default("ENVIRONMENT", "development"));
        let public_base_url = get_or_default("PUBLIC_BASE_URL", "http://localhost:3000")
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_base_url).map_err(|e| {
            ConfigError::InvalidValue("PUBLIC_BASE_URL".to_string(), e.to_string())
        })?;

        let server = ServerConfig {
            bind_address,
            port,
            environment,
            rust_log: get_or_default("RUST_LOG", "info"),
            public_base_url,
            cors_allowed_origins: get_or_default("CORS_ALLOWED_ORIGINS", "*")
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
        };

        let storage_backend = StorageBackend::from(get_or_default("STORAGE_BACKEND", "postgres"));

        // The in-process store needs no database
        let database_url = match storage_backend {
            StorageBackend::Postgres => get_required("DATABASE_URL")?,
            StorageBackend::Memory => get_or_default("DATABASE_URL", ""),
        };

        let database = DatabaseConfig {
            url: database_url,
            max_connections: parse_u32_or_default("DATABASE_MAX_CONNECTIONS", "20")?,
            min_connections: parse_u32_or_default("DATABASE_MIN_CONNECTIONS", "2")?,
            connect_timeout: parse_u64_or_default("DATABASE_CONNECT_TIMEOUT", "30")?,
            idle_timeout: parse_u64_or_default("DATABASE_IDLE_TIMEOUT", "600")?,
            max_lifetime: parse_u64_or_default("DATABASE_MAX_LIFETIME", "1800")?,
        };

        let email = EmailConfig {
            resend_api_key: get_or_default("RESEND_API_KEY", ""),
            resend_api_url: get_or_default("RESEND_API_URL", "https://api.resend.com/emails"),
            from_email: get_or_default("EMAIL_FROM_ADDRESS", "newsletter@localhost"),
            from_name: get_or_default("EMAIL_FROM_NAME", "Newsletter"),
        };

        let max_attempts = parse_u32_or_default("DELIVERY_MAX_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let workers = parse_u32_or_default("DELIVERY_WORKERS", "8")?;
        if workers == 0 {
            return Err(ConfigError::InvalidValue(
                "DELIVERY_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let delivery = DeliveryConfig {
            max_attempts,
            retry_delay_ms: parse_u64_or_default("DELIVERY_RETRY_DELAY_MS", "1000")?,
            send_timeout_secs: parse_u64_or_default("DELIVERY_SEND_TIMEOUT_SECS", "30")?,
            workers: workers as usize,
            content_preview_chars: parse_u32_or_default("CONTENT_PREVIEW_CHARS", "200")? as usize,
        };

        let scheduler = SchedulerConfig {
            enabled: parse_bool_or_default("SCHEDULER_ENABLED", "true"),
            tick_seconds: parse_u64_or_default("SCHEDULER_TICK_SECONDS", "3600")?.max(1),
        };

        let summarizer = SummarizerConfig {
            url: get_optional("SUMMARIZER_URL"),
            api_key: get_optional("SUMMARIZER_API_KEY"),
            model: get_or_default("SUMMARIZER_MODEL", "default"),
            timeout_secs: parse_u64_or_default("SUMMARIZER_TIMEOUT_SECS", "60")?,
            default_instructions: get_or_default(
                "NEWSLETTER_INSTRUCTIONS",
                "Summarize the recent life events as you would to friends.",
            ),
        };

        let tier_match_policy = get_or_default("TIER_MATCH_POLICY", "cumulative")
            .parse::<TierMatchPolicy>()
            .map_err(|e| ConfigError::InvalidValue("TIER_MATCH_POLICY".to_string(), e))?;

        let admin_api_key = get_optional("ADMIN_API_KEY");
        if server.environment == Environment::Production {
            match &admin_api_key {
                Some(key) if key.len() >= 32 => {},
                Some(_) => {
                    return Err(ConfigError::InvalidValue(
                        "ADMIN_API_KEY".to_string(),
                        "Key must be at least 32 characters long in production".to_string(),
                    ))
                },
                None => return Err(ConfigError::MissingVar("ADMIN_API_KEY".to_string())),
            }
        }

        Ok(Self {
            server,
            storage_backend,
            database,
            email,
            delivery,
            scheduler,
            summarizer,
            tier_match_policy,
            admin_api_key,
            disable_embedded_migrations: parse_bool_or_default(
                "DISABLE_EMBEDDED_MIGRATIONS",
                "false",
            ),
        })
    }
}

/// Get the global configuration instance
pub fn config() -> &'static AppConfig {
    &CONFIG
}
