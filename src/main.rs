// Entry point of the content firewall service.
//
// **Architecture Overview:**
// - `core/` = Business logic (storage and transport agnostic)
// - `infra/` = Implementations of core traits (SQLite, mail delivery)
// - `http/` = axum adapters (routes, extractors, error bodies)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Serve the HTTP API until shutdown

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "http/http_layer.rs"]
mod http;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::AppConfig;
use crate::http::{AppState, TrustedProxies};
use crate::infra::mail::AppMailer;
use crate::infra::sqlite::SqliteFirewallStore;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store = Arc::new(
        SqliteFirewallStore::new(&config.database_url)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_url))?,
    );

    let mailer = Arc::new(AppMailer::from_settings(config.smtp.as_ref())?);
    if config.smtp.is_none() {
        tracing::warn!("SMTP_HOST not set, firewall notices will only be logged");
    }

    let state = AppState::new(
        store,
        config.firewall.clone(),
        mailer,
        TrustedProxies::new(config.trusted_proxies.clone()),
    )?;
    let app = http::router(state);

    // ========================================================================
    // SERVER
    // ========================================================================

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Content firewall listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
