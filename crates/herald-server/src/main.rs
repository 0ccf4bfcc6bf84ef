//! # Herald Server
//!
//! Publishes application events to RabbitMQ exchanges.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (herald.toml if present)
//! herald
//!
//! # Run with a specific config file
//! HERALD_CONFIG=/path/to/herald.toml herald
//!
//! # Override settings from the environment
//! HERALD_PORT=8080 HERALD_BROKER__HOST=rabbitmq herald
//! ```

mod bootstrap;
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
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "herald=debug,tenvis_herald_core=debug,tenvis_herald_transport=debug,lapin=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!(
        "Starting Herald on {}:{}, broker {}:{}",
        config.host,
        config.port,
        config.broker.host,
        config.broker.port
    );

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
