//! Publish metrics.
//!
//! Emitted through the `metrics` facade; they are dropped unless the host
//! installs a recorder. Counters carry no per-exchange label, since channel
//! names come from callers.

use metrics::counter;

/// Metric names.
pub mod names {
    pub const MESSAGES_TOTAL: &str = "herald_messages_total";
    pub const MESSAGES_BYTES: &str = "herald_messages_bytes";
}

/// Record one message accepted by the broker channel.
pub fn record_message(bytes: usize) {
    counter!(names::MESSAGES_TOTAL).increment(1);
    counter!(names::MESSAGES_BYTES).increment(bytes as u64);
}
