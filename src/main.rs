//! # Tally - per-key real-time counters
//!
//! Entry point for the counter server.
//!
//! ## Startup
//!
//! 1. **Configuration** - TOML file (optional) overridden by CLI flags
//! 2. **Tracing** - `RUST_LOG` if set, otherwise the configured level
//! 3. **Counter router** - store provider, connection registry, instance gates
//! 4. **Axum API** - REST endpoints and WebSocket streams
//!
//! ## Shutdown
//!
//! Ctrl+C stops accepting connections, drains in-flight requests, then stops
//! every counter instance. Durable state is already committed per mutation.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod config;

use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tally_objects::CounterRouter;
use tally_web::AppState;

use cli::{Cli, Commands, ServeArgs};
use config::TallyConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(&args).await,
        Commands::Config { config } => {
            let config = TallyConfig::load(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let start_time = Instant::now();

    let config = TallyConfig::load(args.config.as_deref())?.with_overrides(args);
    init_tracing(&config.log_level);

    info!("Tally starting...");

    let store = config
        .store_config()
        .context("Store configuration is invalid")?;
    info!(url = %store.url, namespace = %store.namespace, "Counter store configured");

    let router_config = config.router_config();
    let router = CounterRouter::new(store, router_config);
    info!(
        hibernate_after = ?router_config.hibernate_after,
        connection_buffer = router_config.connection_buffer,
        "Counter router initialized"
    );

    info!(
        "Tally started in {:?}, serving on {}",
        start_time.elapsed(),
        config.server.bind_address
    );

    tally_web::run_server(config.server, AppState::new(router), wait_for_shutdown())
        .await
        .context("Web server failed")?;

    info!("Tally stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
