mod commands;
mod config;
mod events;
mod extract;
mod platform;
mod router;
mod scheduler;
mod signature;
mod store;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::platform::line::LineClient;
use crate::router::AppState;
use crate::scheduler::Scheduler;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Reply mode: {:?}", config.bot.reply_mode);
    info!("  Digest mode: {:?}", config.digest.mode);
    info!("  Database: {}", config.store.database_path.display());

    let store = Store::open(&config.store.database_path)?;
    let line = LineClient::new(config.line.clone())?;

    // Everything request handlers and jobs touch is built here, once,
    // before the listener accepts its first connection.
    let state = Arc::new(AppState {
        config,
        store,
        line,
    });

    let jobs = Scheduler::new().await?;
    scheduler::digest::register_jobs(&jobs, Arc::clone(&state)).await?;
    jobs.start().await?;

    let addr = format!(
        "{}:{}",
        state.config.server.host, state.config.server.port
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Webhook server listening on {}", addr);

    axum::serve(listener, webhook::router(state))
        .await
        .context("Server error")?;

    Ok(())
}
