//! In-process broker channel.
//!
//! Keeps a table of declared exchanges and a log of successful operations,
//! applying the same declaration rules a RabbitMQ broker does:
//!
//! - redeclaring with equivalent parameters is a no-op
//! - redeclaring with different parameters fails (`PRECONDITION_FAILED`)
//! - a passive declare of a missing exchange fails (`NOT_FOUND`)
//! - publishing to a missing exchange fails (`NOT_FOUND`)
//!
//! `NOT_FOUND` and `PRECONDITION_FAILED` are channel exceptions: the channel
//! is closed afterwards and every later operation fails with
//! [`TransportError::ConnectionClosed`]. Injected failures leave it open.
//!
//! Clones share state, so a test can keep a handle while the publisher owns
//! another.

use async_trait::async_trait;
use herald_protocol::{ExchangeTopology, OutboundMessage};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

use crate::traits::{BrokerChannel, TransportError};

/// A successful operation against the in-memory broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    /// An exchange declaration, as requested.
    Declare {
        exchange: String,
        topology: ExchangeTopology,
    },
    /// A published message.
    Publish(OutboundMessage),
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, ExchangeTopology>,
    ops: Vec<BrokerOp>,
    fail_declare: HashSet<String>,
    fail_publish: HashSet<String>,
    closed: bool,
}

/// In-memory broker channel.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    state: Arc<Mutex<State>>,
}

impl MemoryChannel {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an exchange up front, as an operator would.
    #[must_use]
    pub fn with_exchange(self, exchange: impl Into<String>, topology: ExchangeTopology) -> Self {
        self.lock()
            .exchanges
            .insert(exchange.into(), stored(&topology));
        self
    }

    /// Make every declaration of `exchange` fail.
    pub fn fail_declare_on(&self, exchange: impl Into<String>) {
        self.lock().fail_declare.insert(exchange.into());
    }

    /// Make every publish to `exchange` fail.
    pub fn fail_publish_on(&self, exchange: impl Into<String>) {
        self.lock().fail_publish.insert(exchange.into());
    }

    /// All successful operations, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<BrokerOp> {
        self.lock().ops.clone()
    }

    /// All published messages, in order.
    #[must_use]
    pub fn published(&self) -> Vec<OutboundMessage> {
        self.lock()
            .ops
            .iter()
            .filter_map(|op| match op {
                BrokerOp::Publish(message) => Some(message.clone()),
                BrokerOp::Declare { .. } => None,
            })
            .collect()
    }

    /// Get the stored topology of an exchange.
    #[must_use]
    pub fn exchange(&self, name: &str) -> Option<ExchangeTopology> {
        self.lock().exchanges.get(name).cloned()
    }

    /// Get the number of exchanges on the broker.
    #[must_use]
    pub fn exchange_count(&self) -> usize {
        self.lock().exchanges.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The broker never stores the passive bit.
fn stored(topology: &ExchangeTopology) -> ExchangeTopology {
    ExchangeTopology {
        passive: false,
        ..topology.clone()
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_exchange(
        &self,
        exchange: &str,
        topology: &ExchangeTopology,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let declare_failed = |reason: &str| TransportError::DeclareFailed {
            exchange: exchange.to_string(),
            reason: reason.to_string(),
        };

        if state.fail_declare.contains(exchange) {
            return Err(declare_failed("injected failure"));
        }

        match state.exchanges.get(exchange).cloned() {
            Some(_) if topology.passive => {}
            Some(existing) if existing != stored(topology) => {
                state.closed = true;
                return Err(declare_failed("PRECONDITION_FAILED - inequivalent arguments"));
            }
            Some(_) => {}
            None if topology.passive => {
                state.closed = true;
                return Err(declare_failed("NOT_FOUND - no exchange"));
            }
            None => {
                state
                    .exchanges
                    .insert(exchange.to_string(), stored(topology));
            }
        }

        trace!(exchange = %exchange, kind = %topology.kind, "Declared exchange");
        state.ops.push(BrokerOp::Declare {
            exchange: exchange.to_string(),
            topology: topology.clone(),
        });
        Ok(())
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let publish_failed = |reason: &str| TransportError::PublishFailed {
            exchange: message.exchange.clone(),
            reason: reason.to_string(),
        };

        if state.fail_publish.contains(&message.exchange) {
            return Err(publish_failed("injected failure"));
        }
        if !state.exchanges.contains_key(&message.exchange) {
            state.closed = true;
            return Err(publish_failed("NOT_FOUND - no exchange"));
        }

        trace!(exchange = %message.exchange, routing_key = %message.routing_key, "Published");
        state.ops.push(BrokerOp::Publish(message.clone()));
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().closed = true;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_protocol::ExchangeKind;

    fn durable_topic() -> ExchangeTopology {
        ExchangeTopology {
            durable: true,
            ..ExchangeTopology::with_kind(ExchangeKind::Topic)
        }
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let channel = MemoryChannel::new();
        let topology = ExchangeTopology::default();

        channel.declare_exchange("orders", &topology).await.unwrap();
        channel.declare_exchange("orders", &topology).await.unwrap();

        assert_eq!(channel.exchange_count(), 1);
        assert_eq!(channel.exchange("orders"), Some(topology));
    }

    #[tokio::test]
    async fn test_inequivalent_redeclare_fails() {
        let channel = MemoryChannel::new();
        channel
            .declare_exchange("orders", &ExchangeTopology::default())
            .await
            .unwrap();

        let result = channel.declare_exchange("orders", &durable_topic()).await;
        assert!(matches!(result, Err(TransportError::DeclareFailed { .. })));
        assert_eq!(channel.exchange("orders"), Some(ExchangeTopology::default()));
        assert!(!channel.is_open());
    }

    #[tokio::test]
    async fn test_passive_declare() {
        let passive = ExchangeTopology {
            passive: true,
            ..durable_topic()
        };

        let channel = MemoryChannel::new();
        assert!(channel.declare_exchange("orders", &passive).await.is_err());
        assert_eq!(channel.exchange_count(), 0);
        assert!(!channel.is_open());
        assert!(matches!(
            channel
                .declare_exchange("notifications", &ExchangeTopology::default())
                .await,
            Err(TransportError::ConnectionClosed)
        ));

        let channel = MemoryChannel::new().with_exchange("orders", durable_topic());
        channel.declare_exchange("orders", &passive).await.unwrap();
        assert_eq!(channel.exchange("orders"), Some(durable_topic()));
    }

    #[tokio::test]
    async fn test_publish_requires_exchange() {
        let channel = MemoryChannel::new();
        let message = OutboundMessage::new("orders", "order.created", b"{}".to_vec());

        assert!(matches!(
            channel.publish(&message).await,
            Err(TransportError::PublishFailed { .. })
        ));
        assert!(!channel.is_open());

        let channel = MemoryChannel::new();
        channel
            .declare_exchange("orders", &ExchangeTopology::default())
            .await
            .unwrap();
        channel.publish(&message).await.unwrap();
        assert_eq!(channel.published(), vec![message]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let channel = MemoryChannel::new();
        channel.fail_declare_on("a");
        channel.fail_publish_on("b");

        assert!(channel
            .declare_exchange("a", &ExchangeTopology::default())
            .await
            .is_err());

        channel
            .declare_exchange("b", &ExchangeTopology::default())
            .await
            .unwrap();
        let message = OutboundMessage::new("b", "event", bytes::Bytes::from_static(b"{}"));
        assert!(channel.publish(&message).await.is_err());
        assert!(channel.published().is_empty());
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let channel = MemoryChannel::new();
        let observer = channel.clone();

        channel
            .declare_exchange("orders", &ExchangeTopology::default())
            .await
            .unwrap();
        assert_eq!(observer.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let channel = MemoryChannel::new();
        assert!(channel.is_open());

        channel.close().await.unwrap();
        assert!(!channel.is_open());
        assert!(matches!(
            channel
                .declare_exchange("orders", &ExchangeTopology::default())
                .await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
