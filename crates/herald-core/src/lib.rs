//! # herald-core
//!
//! Exchange resolution and broadcast publishing for the Herald event
//! broadcaster.
//!
//! - **Config** - Per-exchange settings and loose boolean normalization
//! - **Resolver** - Channel name to exchange topology
//! - **Broadcaster** - The contract hosts program against
//! - **Publisher** - `ExchangeBroadcaster`, the AMQP fan-out implementation
//! - **Metrics** - Message counters, emitted as each publish succeeds
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────────┐     ┌───────────────┐
//! │    Host     │────▶│ ExchangeBroadcaster  │────▶│ BrokerChannel │
//! └─────────────┘     └──────────────────────┘     └───────────────┘
//!                                │
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │   ExchangeResolver   │
//!                     └──────────────────────┘
//! ```

pub mod broadcaster;
pub mod config;
pub mod metrics;
pub mod publisher;
pub mod resolver;

pub use broadcaster::{AuthDecision, AuthRequest, BroadcastError, Broadcaster};
pub use config::{parse_bool, ExchangeSettings, LooseBool, RawExchangeConfig};
pub use publisher::ExchangeBroadcaster;
pub use resolver::ExchangeResolver;
