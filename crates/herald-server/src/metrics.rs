//! Metrics collection and export for Herald.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Metric names.
///
/// Per-message counters are recorded by the publisher, under
/// [`tenvis_herald_core::metrics::names`].
pub mod names {
    pub use tenvis_herald_core::metrics::names::{MESSAGES_BYTES, MESSAGES_TOTAL};

    pub const BROADCASTS_TOTAL: &str = "herald_broadcasts_total";
    pub const AUTH_DENIED_TOTAL: &str = "herald_auth_denied_total";
    pub const LATENCY_SECONDS: &str = "herald_broadcast_latency_seconds";
    pub const ERRORS_TOTAL: &str = "herald_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(names::BROADCASTS_TOTAL, "Total number of broadcast calls");
    metrics::describe_counter!(
        names::MESSAGES_TOTAL,
        "Total number of messages published"
    );
    metrics::describe_counter!(
        names::MESSAGES_BYTES,
        "Total bytes of message bodies published"
    );
    metrics::describe_counter!(
        names::AUTH_DENIED_TOTAL,
        "Total number of rejected subscription authorizations"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Broadcast call latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a broadcast call.
pub fn record_broadcast() {
    counter!(names::BROADCASTS_TOTAL).increment(1);
}

/// Record a rejected authorization.
pub fn record_auth_denied() {
    counter!(names::AUTH_DENIED_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type.to_string()).increment(1);
}

/// Records broadcast latency when dropped.
pub struct BroadcastTimer {
    start: Instant,
}

impl BroadcastTimer {
    /// Start timing a broadcast call.
    #[must_use]
    pub fn start() -> Self {
        record_broadcast();
        Self {
            start: Instant::now(),
        }
    }
}

impl Drop for BroadcastTimer {
    fn drop(&mut self) {
        histogram!(names::LATENCY_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}
