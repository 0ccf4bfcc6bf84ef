//! Broadcaster construction from configuration.

use crate::config::Config;
use anyhow::{Context, Result};
use herald_protocol::ExchangeKind;
use tenvis_herald_core::{ExchangeBroadcaster, ExchangeResolver};
use tenvis_herald_transport::{AmqpChannel, AmqpSettings};

/// Build the exchange resolver from the `[exchanges]` table.
#[must_use]
pub fn resolver(config: &Config) -> ExchangeResolver {
    ExchangeResolver::from_config(
        ExchangeKind::from(config.default_exchange_type.as_str()),
        config.exchanges.clone(),
    )
}

/// Connect to the broker and build the broadcaster.
///
/// # Errors
///
/// Returns an error if the broker connection cannot be established.
pub async fn connect(config: &Config) -> Result<ExchangeBroadcaster<AmqpChannel>> {
    let settings = AmqpSettings::from(&config.broker);
    let channel = AmqpChannel::connect(&settings).await.with_context(|| {
        format!(
            "Failed to connect to broker at {}:{}",
            settings.host, settings.port
        )
    })?;

    Ok(ExchangeBroadcaster::new(channel, resolver(config)))
}
