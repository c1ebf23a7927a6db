// Migration orchestrator
// Embedded in the application binary for distroless container compatibility

pub mod diesel;

use std::error::Error;
use tracing::{error, info};

/// Configuration for migration execution
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub database_url: String,
    pub skip_diesel: bool,
    pub environment: String,
}

impl MigrationConfig {
    pub fn from_app_config(config: &crate::app_config::AppConfig) -> Self {
        Self {
            database_url: config.database.url.clone(),
            skip_diesel: config.disable_embedded_migrations,
            environment: config.server.environment.to_string(),
        }
    }
}

/// Runs the PostgreSQL schema migrations
pub async fn run_all_migrations(config: MigrationConfig) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!(
        "[MIGRATIONS] Starting migration process for environment: {}",
        config.environment
    );

    if config.skip_diesel {
        info!("[MIGRATIONS] Skipping Diesel migrations (disabled in config)");
        return Ok(());
    }

    match diesel::run_migrations(&config.database_url).await {
        Ok(0) => info!("[MIGRATIONS] Diesel migrations up to date"),
        Ok(applied_count) => info!("[MIGRATIONS] Applied {} Diesel migrations", applied_count),
        Err(e) => {
            error!("[MIGRATIONS] Diesel migration failed: {}", e);
            return Err(format!("Diesel migration failed: {}", e).into());
        },
    }

    Ok(())
}
