//! Broker channel abstraction traits for Herald.
//!
//! The publisher only ever talks to a broker through [`BrokerChannel`], so the
//! AMQP client can be swapped for the in-memory channel in tests.

use async_trait::async_trait;
use herald_protocol::{ExchangeTopology, OutboundMessage};
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel or its connection is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Could not open a connection or channel.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// The broker refused an exchange declaration.
    #[error("Declare of exchange '{exchange}' failed: {reason}")]
    DeclareFailed { exchange: String, reason: String },

    /// The publish could not be submitted.
    #[error("Publish to exchange '{exchange}' failed: {reason}")]
    PublishFailed { exchange: String, reason: String },

    /// The broker negatively acknowledged a confirmed publish.
    #[error("Publish to exchange '{0}' was nacked by the broker")]
    Nacked(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A long-lived channel to a message broker.
///
/// Implementations are not required to tolerate interleaved calls from
/// several tasks; callers serialize access (see `ExchangeBroadcaster`).
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare an exchange.
    ///
    /// Declaring an existing exchange with the same parameters is a no-op.
    async fn declare_exchange(
        &self,
        exchange: &str,
        topology: &ExchangeTopology,
    ) -> Result<(), TransportError>;

    /// Submit a message to an exchange.
    ///
    /// Returns once the transport accepted the message. Broker confirmation
    /// is only awaited if the channel runs in confirm mode.
    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    /// Close the channel and its connection.
    async fn close(&self) -> Result<(), TransportError>;

    /// Get the transport name (e.g., "amqp", "memory").
    fn name(&self) -> &'static str;

    /// Check if the channel is still open.
    fn is_open(&self) -> bool;
}
