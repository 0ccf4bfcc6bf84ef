//! # herald-protocol
//!
//! Wire-level definitions for the Herald event broadcaster.
//!
//! Herald publishes application events onto an AMQP broker. Every destination
//! channel is an exchange, the event name is the routing key and the body is
//! the UTF-8 JSON encoding of the event payload.
//!
//! ## Types
//!
//! - `ExchangeKind` / `ExchangeTopology` - Parameters of an exchange declaration
//! - `OutboundMessage` - One message bound for one exchange
//! - `BroadcastRequest` - A named event fanned out to several channels
//!
//! ## Example
//!
//! ```rust
//! use herald_protocol::{codec, OutboundMessage};
//! use serde_json::json;
//!
//! let body = codec::encode_payload(&json!({"id": 42})).unwrap();
//! let message = OutboundMessage::new("orders", "order.created", body);
//!
//! assert_eq!(&message.body[..], br#"{"id":42}"#);
//! ```

pub mod codec;
pub mod exchange;
pub mod message;

pub use codec::{decode_body, encode_payload, CodecError, Payload};
pub use exchange::{
    validate_exchange_name, validate_routing_key, ExchangeKind, ExchangeTopology,
    DEFAULT_EXCHANGE_KIND, MAX_NAME_LENGTH,
};
pub use message::{BroadcastRequest, OutboundMessage};
