//! Signaling server entry point

use anyhow::{Context, Result};
use clap::Parser;
use huddle_server::{Config, ServerState, router};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("huddle_server=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    let mut state = ServerState::new(config.room_capacity);
    match config.twilio_issuer() {
        Some(issuer) => state = state.with_credentials(Arc::new(issuer)),
        None => tracing::warn!("ACCOUNT_SID/AUTH_TOKEN not set, relay credentials disabled"),
    }

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, room_capacity = config.room_capacity, "Server is running");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
