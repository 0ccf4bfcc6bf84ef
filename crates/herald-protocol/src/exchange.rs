//! Exchange declaration parameters.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Exchange type used when neither the channel nor the process configures one.
pub const DEFAULT_EXCHANGE_KIND: ExchangeKind = ExchangeKind::Fanout;

/// Maximum exchange name and routing key length (AMQP short string).
pub const MAX_NAME_LENGTH: usize = 255;

/// Prefix the broker reserves for its own exchanges.
const RESERVED_PREFIX: &str = "amq.";

/// Validate an exchange name before it is sent to the broker.
///
/// # Errors
///
/// Returns an error message if the name is invalid.
pub fn validate_exchange_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Exchange name cannot be empty");
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err("Exchange name too long");
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err("Exchange names starting with 'amq.' are reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Exchange name contains invalid characters");
    }
    Ok(())
}

/// Validate a routing key. Empty keys are allowed.
///
/// # Errors
///
/// Returns an error message if the key does not fit in a short string.
pub fn validate_routing_key(key: &str) -> Result<(), &'static str> {
    if key.len() > MAX_NAME_LENGTH {
        return Err("Routing key too long");
    }
    Ok(())
}

/// AMQP exchange type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
    /// Plugin-provided type such as `x-delayed-message`.
    Custom(String),
}

impl ExchangeKind {
    /// The type name sent in the `exchange.declare` frame.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Headers => "headers",
            ExchangeKind::Custom(name) => name,
        }
    }
}

impl Default for ExchangeKind {
    fn default() -> Self {
        DEFAULT_EXCHANGE_KIND
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Broker type names are case-sensitive.
        Ok(match s {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            other => ExchangeKind::Custom(other.to_string()),
        })
    }
}

impl From<String> for ExchangeKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for ExchangeKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<ExchangeKind> for String {
    fn from(kind: ExchangeKind) -> String {
        kind.as_str().to_string()
    }
}

/// Resolved parameters for declaring one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeTopology {
    /// Exchange type.
    pub kind: ExchangeKind,
    /// Fail if the exchange does not already exist.
    pub passive: bool,
    /// Survive broker restarts.
    pub durable: bool,
    /// Remove once the last binding is gone.
    pub auto_delete: bool,
    /// Only reachable through exchange-to-exchange bindings.
    pub internal: bool,
}

impl ExchangeTopology {
    /// Topology for a channel with no explicit configuration.
    #[must_use]
    pub fn with_kind(kind: ExchangeKind) -> Self {
        Self {
            kind,
            passive: false,
            durable: false,
            auto_delete: true,
            internal: false,
        }
    }
}

impl Default for ExchangeTopology {
    fn default() -> Self {
        Self::with_kind(ExchangeKind::default())
    }
}
