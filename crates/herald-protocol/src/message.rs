//! Broadcast request and outbound message types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named event destined for one or more channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    /// Destination channels, published to in this order.
    pub channels: Vec<String>,
    /// Event name, used as the routing key.
    pub event: String,
    /// Event payload.
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl BroadcastRequest {
    /// Create a request with an empty payload.
    #[must_use]
    pub fn new<I, S>(channels: I, event: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
            event: event.into(),
            payload: Map::new(),
        }
    }

    /// Set a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Target exchange (the channel name).
    pub exchange: String,
    /// Routing key (the event name).
    pub routing_key: String,
    /// Serialized payload.
    pub body: Bytes,
}

impl OutboundMessage {
    /// Create a new outbound message.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            body: body.into(),
        }
    }

    /// Get the body size in bytes.
    #[must_use]
    pub fn body_size(&self) -> usize {
        self.body.len()
    }
}
