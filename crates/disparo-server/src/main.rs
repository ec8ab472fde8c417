//! Disparo - Campaign dispatch and conversation recovery entry point

use anyhow::Result;
use disparo_api::AppState;
use disparo_common::config::{Config, LoggingConfig};
use disparo_core::{
    CampaignScheduler, DispatchPacer, HealthMonitor, RecoveryEngine, TransportChain, WebhookSender,
};
use disparo_storage::{DatabasePool, MemoryStore, Repositories};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Disparo ({})...", config.server.instance);

    // Initialize storage
    let (repos, db_pool) = match config.database.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory backend; state is lost on shutdown");
            (Repositories::memory(Arc::new(MemoryStore::new())), None)
        }
        _ => {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            db_pool.migrate().await?;
            info!("Database migrations completed");

            (Repositories::postgres(db_pool.clone()), Some(db_pool))
        }
    };

    // Initialize webhook delivery
    let chain = TransportChain::from_config(&config.webhook)?;
    info!("Webhook transports: {}", chain.names().join(" -> "));
    let sender: Arc<dyn WebhookSender> = Arc::new(chain);

    let recovery = Arc::new(RecoveryEngine::new(
        repos.clone(),
        sender.clone(),
        config.recovery.clone(),
    ));

    let mut handles = Vec::new();

    // Start campaign scheduler
    if config.scheduler.enabled {
        let pacer = Arc::new(DispatchPacer::new(
            repos.clone(),
            sender.clone(),
            config.server.instance.clone(),
        ));
        let scheduler = CampaignScheduler::new(repos.clone(), pacer)
            .with_poll_interval(config.scheduler.poll_interval_secs);
        handles.push(tokio::spawn(async move {
            scheduler.run().await;
        }));
    } else {
        info!("Campaign scheduler disabled");
    }

    // Start health monitor
    if config.health.enabled {
        let monitor = HealthMonitor::new(repos.clone(), sender.clone(), config.health.clone());
        handles.push(tokio::spawn(async move {
            monitor.run().await;
        }));
    } else {
        info!("Campaign health monitor disabled");
    }

    // Start recovery sweep
    if config.recovery.enabled {
        let recovery = recovery.clone();
        handles.push(tokio::spawn(async move {
            recovery.run().await;
        }));
    } else {
        info!("Recovery sweep disabled");
    }

    // Start API server
    if config.api.enabled {
        let app = disparo_api::create_router(AppState {
            repos: repos.clone(),
            recovery: recovery.clone(),
            db_pool,
        });
        let listener = tokio::net::TcpListener::bind(&config.api.bind).await?;
        info!("Starting API server on {}", config.api.bind);

        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        }));
    } else {
        info!("API server disabled");
    }

    info!("Disparo started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    for handle in handles {
        handle.abort();
    }

    info!("Disparo shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},disparo=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
