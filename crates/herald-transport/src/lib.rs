//! # herald-transport
//!
//! Broker channel abstraction for the Herald event broadcaster.
//!
//! - **AMQP** - RabbitMQ over `lapin` (feature `amqp`, on by default)
//! - **Memory** - In-process broker double that records every operation
//!
//! Both implement [`BrokerChannel`]:
//!
//! ```rust,ignore
//! use herald_transport::{AmqpChannel, AmqpSettings, BrokerChannel};
//!
//! let channel = AmqpChannel::connect(&AmqpSettings::default()).await?;
//! channel.declare_exchange("orders", &topology).await?;
//! channel.publish(&message).await?;
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use memory::{BrokerOp, MemoryChannel};
pub use traits::{BrokerChannel, TransportError};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpChannel, AmqpSettings};
