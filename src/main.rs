//! Duskmere Game Server
//!
//! A persistent multiplayer text world served over WebSocket, with a small
//! HTTP status surface alongside it.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use duskmere_server::config::ServerConfig;
use duskmere_server::net::{api, gateway};
use duskmere_server::storage::{MemoryStore, PgStore, SharedStore};
use duskmere_server::{Game, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("╔══════════════════════════════════════════════╗");
    info!("║          Duskmere Game Server v{}          ║", VERSION);
    info!("╚══════════════════════════════════════════════╝");

    // Load configuration
    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Pick the character store: Postgres when reachable, memory otherwise
    let store = create_store(&config).await;

    // Boot the game world
    let game = Game::boot(config, store).await?;
    let timer_handles = game.spawn_timers();

    // Spawn the WebSocket gateway
    let gateway_game = Arc::clone(&game);
    let gateway_shutdown_rx = shutdown_tx.subscribe();
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway::run(gateway_game, gateway_shutdown_rx).await {
            error!("Gateway failed: {}", e);
        }
    });

    // Spawn the status API
    let api_game = Arc::clone(&game);
    let api_shutdown_rx = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::run(api_game, api_shutdown_rx).await {
            error!("Status API failed: {}", e);
        }
    });

    info!("Server startup complete!");
    info!("{} is ready for travelers", game.config().server_name);

    // Wait for shutdown signal
    wait_for_shutdown(shutdown_tx.clone()).await;

    info!("Shutting down server...");

    // Wait for the listeners to finish
    let _ = gateway_handle.await;
    let _ = api_handle.await;

    // Timers loop forever; stop them before the final save
    for handle in timer_handles {
        handle.abort();
    }

    game.shutdown().await;
    info!("Server shutdown complete. Goodbye!");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,duskmere_server=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .init();
}

/// Create the character store, falling back to memory when Postgres is out of reach
async fn create_store(config: &ServerConfig) -> SharedStore {
    if config.dev_mode {
        info!("Dev mode: using the in-memory character store");
        return Arc::new(MemoryStore::new());
    }

    match PgPoolOptions::new()
        .max_connections(config.database.pool_size)
        .connect(&config.database_url())
        .await
    {
        Ok(pool) => {
            info!("Database pool created for character persistence");
            Arc::new(PgStore::new(pool))
        }
        Err(e) => {
            warn!(
                "Failed to create database pool: {}. Characters will not outlive this process.",
                e
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    // Signal all tasks to shut down
    let _ = shutdown_tx.send(());
}
