//! # Confab Server
//!
//! Realtime chat server: presence, rooms, and message routing over
//! WebSocket.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! confab
//!
//! # Run with environment variables
//! CONFAB_PORT=8080 CONFAB_HOST=0.0.0.0 confab
//! ```
//!
//! Configuration is read from `confab.toml` if present (see `config.rs`
//! for the probed paths).

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "confab=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Confab server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
