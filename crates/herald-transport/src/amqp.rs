//! AMQP transport implementation.
//!
//! This module provides a RabbitMQ channel using `lapin`. One connection and
//! one channel are opened at startup and reused for every broadcast.

use async_trait::async_trait;
use herald_protocol::{ExchangeKind, ExchangeTopology, OutboundMessage};
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::fmt;
use tracing::{debug, info, warn};

use crate::traits::{BrokerChannel, TransportError};

/// Reply code sent when closing the channel and connection.
const REPLY_SUCCESS: u16 = 200;

/// AMQP connection settings.
#[derive(Clone)]
pub struct AmqpSettings {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Virtual host.
    pub vhost: String,
    /// Put the channel in confirm mode and wait for each publish to be acked.
    pub publisher_confirms: bool,
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            publisher_confirms: false,
        }
    }
}

impl fmt::Debug for AmqpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("publisher_confirms", &self.publisher_confirms)
            .finish()
    }
}

impl AmqpSettings {
    /// Build the connection URI.
    ///
    /// Credentials are passed structurally, so they need no percent-encoding.
    #[must_use]
    pub fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.user.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            ..Default::default()
        }
    }
}

/// Map an exchange type to its `lapin` counterpart.
fn exchange_kind(kind: &ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        ExchangeKind::Custom(name) => lapin::ExchangeKind::Custom(name.clone()),
    }
}

fn declare_options(topology: &ExchangeTopology) -> ExchangeDeclareOptions {
    ExchangeDeclareOptions {
        passive: topology.passive,
        durable: topology.durable,
        auto_delete: topology.auto_delete,
        internal: topology.internal,
        nowait: false,
    }
}

/// A RabbitMQ channel and the connection that owns it.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
    confirms: bool,
}

impl AmqpChannel {
    /// Connect to the broker and open a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or channel cannot be opened, or if
    /// confirm mode is requested and the broker refuses it.
    pub async fn connect(settings: &AmqpSettings) -> Result<Self, TransportError> {
        let properties = ConnectionProperties::default().with_connection_name("herald".into());
        let connection = Connection::connect_uri(settings.uri(), properties)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        if settings.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        }

        info!(
            host = %settings.host,
            port = settings.port,
            vhost = %settings.vhost,
            confirms = settings.publisher_confirms,
            "Connected to AMQP broker"
        );

        Ok(Self {
            connection,
            channel,
            confirms: settings.publisher_confirms,
        })
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(
        &self,
        exchange: &str,
        topology: &ExchangeTopology,
    ) -> Result<(), TransportError> {
        // A channel exception from an earlier call leaves the channel closed.
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        self.channel
            .exchange_declare(
                exchange,
                exchange_kind(&topology.kind),
                declare_options(topology),
                FieldTable::default(),
            )
            .await
            .map_err(|e| TransportError::DeclareFailed {
                exchange: exchange.to_string(),
                reason: e.to_string(),
            })?;

        debug!(exchange = %exchange, kind = %topology.kind, "Exchange declared");
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        let publish_failed = |e: lapin::Error| TransportError::PublishFailed {
            exchange: message.exchange.clone(),
            reason: e.to_string(),
        };

        let confirm = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                BasicProperties::default(),
            )
            .await
            .map_err(publish_failed)?;

        if self.confirms {
            let confirmation = confirm.await.map_err(publish_failed)?;
            if confirmation.is_nack() {
                warn!(exchange = %message.exchange, "Publish nacked by broker");
                return Err(TransportError::Nacked(message.exchange.clone()));
            }
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.channel.status().connected() {
            self.channel
                .close(REPLY_SUCCESS, "Bye")
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?;
        }
        if self.connection.status().connected() {
            self.connection
                .close(REPLY_SUCCESS, "Bye")
                .await
                .map_err(|e| TransportError::Other(e.to_string()))?;
        }

        info!("AMQP connection closed");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "amqp"
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected()
    }
}
