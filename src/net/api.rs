//! Status API module
//!
//! A small HTTP surface next to the gateway: a liveness probe and a
//! point-in-time status snapshot. Built with Axum; the game itself is the
//! only state.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::Result;
use crate::game::orchestrator::{Game, GameStatus};

/// Create the status router
pub fn create_router(game: Arc<Game>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(game)
}

/// Serve the status API until shutdown
pub async fn run(game: Arc<Game>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
    let address = format!("0.0.0.0:{}", game.config().api_port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "Status API listening");

    let router = create_router(game);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("Status API shutting down");
        })
        .await?;

    Ok(())
}

/// Liveness probe
async fn health_check() -> &'static str {
    "OK"
}

/// Snapshot of the running game
async fn status(State(game): State<Arc<Game>>) -> Json<GameStatus> {
    Json(game.status())
}
