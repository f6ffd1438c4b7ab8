//! Molthook Server - Main Entry Point
//!
//! Webhook bridge for Moltbook agents.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use molthook_server::{
    api, config,
    poller::{CycleScheduler, PollSettings, Poller},
    subscriptions::{MemoryStore, SubscriptionStore},
    upstream::UpstreamClient,
    webhooks::{Deliverer, DeliverySettings},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "molthook_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %config.upstream_base_url,
        "Starting Molthook Server"
    );

    let store: Arc<dyn SubscriptionStore> = Arc::new(MemoryStore::new(config.seen_capacity));

    let upstream = UpstreamClient::new(
        &config.upstream_base_url,
        Duration::from_secs(config.upstream_timeout_secs),
    )?;

    let (deliverer, retry_worker) =
        Deliverer::new(store.clone(), DeliverySettings::from_config(&config))?;

    let poller = Arc::new(Poller::new(
        upstream,
        store.clone(),
        PollSettings::from_config(&config),
    ));
    let scheduler = CycleScheduler::new(
        poller,
        deliverer.clone(),
        store.clone(),
        Duration::from_secs(config.poll_interval_secs),
    );

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(retry_worker.run(shutdown.clone()));
    let scheduler_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    // Build application state and router
    let state = api::AppState::new(store, deliverer, config.clone());
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = {
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal, cleaning up...");
            shutdown.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    shutdown.cancel();
    let (worker, scheduler) = tokio::join!(worker_handle, scheduler_handle);
    report_task_exit("Retry worker", worker);
    report_task_exit("Scheduler", scheduler);

    info!("Server shutdown complete");

    Ok(())
}

/// Log a background task that panicked or was aborted. Returns `true` on a
/// clean exit.
fn report_task_exit(name: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("{} task failed: {}", name, e);
            false
        }
    }
}
