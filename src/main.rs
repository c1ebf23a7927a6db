use anyhow::Context;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsletter_core::{
    app_config, build_router, db::mask_connection_string, initialize_app_state, Scheduler,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsletter_core=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = app_config::config();
    info!(
        "Starting newsletter-core on {} ({})",
        config.server.bind_address, config.server.environment
    );
    if !config.database.url.is_empty() {
        info!("Database URL: {}", mask_connection_string(&config.database.url));
    }

    let state = initialize_app_state(config)
        .await
        .map_err(|e| anyhow::anyhow!("Initialization failed: {}", e))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = Scheduler::new(
            state.dispatcher.clone(),
            state.clock.clone(),
            Duration::from_secs(config.scheduler.tick_seconds),
            shutdown_rx.clone(),
        );
        Some(tokio::spawn(scheduler.run()))
    } else {
        warn!("Scheduler disabled; deliveries run only through the admin endpoint");
        None
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("Listening on {}", config.server.bind_address);

    let mut server_shutdown = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutdown signal received");
        let _ = signal_tx.send(true);
    });

    server.await.context("HTTP server error")?;

    // Let in-flight deliveries finish or record their retry state
    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            error!("Scheduler task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}
