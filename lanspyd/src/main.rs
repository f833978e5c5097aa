mod api;
mod config;
mod discovery;
mod liveness;
mod registry;
mod registry_manager;
mod scanner;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use shared::protocol::Beacon;
use crate::config::Config;
use crate::registry::store::Store;
use crate::registry_manager::RegistryHandle;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lanspyd=info"))
        )
        .init();

    tracing::info!("Starting lanspyd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/lanspy/lanspyd.toml".to_string());

    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!(
        "Discovery on {} every {} ms, interface scan every {} ms",
        config.discovery.group_addr(),
        config.discovery.sending_period_ms,
        config.scanner.delayed_check_ms
    );

    // Registry thread and its change fingerprint
    let initial_hash = registry::hash::compute_hash(&Default::default());
    let (hash_tx, hash_rx) = watch::channel(initial_hash);
    let registry = RegistryHandle::spawn(Store::new(), hash_tx);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();
    let mut handles = Vec::new();

    // Interface scanner
    let scan_registry = registry.clone();
    let scan_delay = config.scanner.delayed_check();
    let scan_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = scanner::run_scanner(scan_registry, scan_delay, scan_cancel).await {
            tracing::error!("Interface scanner error: {:#}", e);
        }
    }));

    // Multicast announcer and listener share one socket. If it cannot be
    // opened the rest of the daemon keeps running without peer discovery.
    match discovery::socket::open_multicast(config.discovery.port) {
        Ok(socket) => {
            let target = SocketAddr::V4(config.discovery.group_addr());
            let beacon = Beacon::new(config.discovery.beacon.clone(), None);
            let period = config.discovery.sending_period();
            let announce_socket = socket.clone();
            let announce_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = discovery::announcer::run_announcer(
                    announce_socket,
                    target,
                    beacon,
                    period,
                    announce_cancel,
                )
                .await
                {
                    tracing::error!("Announcer error: {:#}", e);
                }
            }));

            let group = config.discovery.group;
            let listen_registry = registry.clone();
            let listen_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                if let Err(e) = discovery::listener::run_listener(socket, group, listen_registry, listen_cancel).await {
                    tracing::error!("Beacon listener error: {:#}", e);
                }
            }));
        }
        Err(e) => {
            tracing::error!("Multicast discovery disabled: {:#}", e);
        }
    }

    // Liveness sweeper
    let sweep_registry = registry.clone();
    let sweep_interval = config.liveness.sweep_interval();
    let sweep_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = liveness::run(sweep_registry, sweep_interval, sweep_cancel).await {
            tracing::error!("Liveness sweeper error: {:#}", e);
        }
    }));

    // Build API router
    let listen = config.api.listen.clone();
    let app_state = api::routes::AppState {
        registry: registry.clone(),
        hash_rx,
        config: Arc::new(config),
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind to {}", listen))?;

    tracing::info!("API listening on {}", listen);

    let server_cancel = cancel.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Wait for all tasks to complete
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Task panicked during shutdown: {}", e);
        }
    }

    // Shutdown registry thread
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
