//! The broadcaster contract hosts program against.

use async_trait::async_trait;
use herald_protocol::{CodecError, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenvis_herald_transport::TransportError;
use thiserror::Error;

/// Broadcast errors.
///
/// `published` counts the channels that had already received the event when
/// the call failed. Those messages are not retracted.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The payload could not be serialized.
    #[error("Failed to serialize payload for event '{event}': {source}")]
    Serialization {
        event: String,
        published: usize,
        #[source]
        source: CodecError,
    },

    /// The broker channel failed while declaring or publishing.
    #[error("Broker error on channel '{channel}': {source}")]
    Transport {
        channel: String,
        published: usize,
        #[source]
        source: TransportError,
    },
}

impl BroadcastError {
    /// Number of channels published to before the failure.
    #[must_use]
    pub fn published(&self) -> usize {
        match self {
            BroadcastError::Serialization { published, .. }
            | BroadcastError::Transport { published, .. } => *published,
        }
    }
}

/// A subscription authorization request from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    /// Channel the client wants to join.
    pub channel_name: String,
    /// Client socket identifier.
    pub socket_id: Option<String>,
    /// Authenticated user, if the host knows one.
    pub user_id: Option<String>,
}

/// Outcome of an authorization request.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    /// Access granted, with the auth result to hand back to the client.
    Granted(Value),
    /// Access denied.
    Denied,
}

impl AuthDecision {
    /// Check if access was denied.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, AuthDecision::Denied)
    }
}

/// A pluggable event broadcaster.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish `event` with `payload` to every channel, in order.
    ///
    /// # Errors
    ///
    /// Returns an error on the first serialization or broker failure; later
    /// channels are not attempted.
    async fn broadcast(
        &self,
        channels: &[String],
        event: &str,
        payload: &dyn Payload,
    ) -> Result<(), BroadcastError>;

    /// Authorize a client subscription.
    fn authorize(&self, request: &AuthRequest) -> AuthDecision;

    /// Check the auth result returned to a client.
    fn is_valid_auth_response(&self, request: &AuthRequest, result: &Value) -> bool;

    /// Check if the broker channel can still carry broadcasts.
    async fn is_open(&self) -> bool;

    /// Get the transport name (e.g., "amqp", "memory").
    fn transport(&self) -> &'static str;
}
