//! Prometheus Metrics Module
//!
//! Exposes pipeline metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Messages**: Bus messages received and decode failures, by topic
//! - **Points**: Points emitted and suppressed by the normalizer
//! - **Sink**: Flushes, flushed points, write failures and flush latency
//! - **Price table**: Size, applied updates and refresh failures
//! - **Bus**: Publish failures and subscription reconnects
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::topic::Topic;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Idempotent. If another global recorder is already installed the returned
/// handle still renders, but nothing recorded through the facade reaches it.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install Prometheus recorder");
                    PrometheusBuilder::new().build_recorder().handle()
                }
            };

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Message counters
    describe_counter!(
        "signal_hub_messages_received_total",
        "Total bus messages received by the shipper"
    );
    describe_counter!(
        "signal_hub_decode_failures_total",
        "Total messages dropped because the payload did not match its topic schema"
    );

    // Point counters
    describe_counter!(
        "signal_hub_points_emitted_total",
        "Total normalized points handed to the sink writer"
    );
    describe_counter!(
        "signal_hub_points_suppressed_total",
        "Total messages suppressed because a conversion price was unknown"
    );

    // Sink
    describe_counter!("signal_hub_flushes_total", "Total sink flushes");
    describe_counter!(
        "signal_hub_flushed_points_total",
        "Total points sent to the time-series backend"
    );
    describe_counter!(
        "signal_hub_write_failures_total",
        "Total failed batch writes (points dropped)"
    );
    describe_histogram!(
        "signal_hub_flush_duration_seconds",
        "Time to write one batch to the time-series backend"
    );

    // Price table
    describe_gauge!(
        "signal_hub_price_table_symbols",
        "Number of symbols with a recorded price"
    );
    describe_counter!(
        "signal_hub_price_updates_total",
        "Total per-symbol price assignments applied to the table"
    );
    describe_counter!(
        "signal_hub_price_refresh_failures_total",
        "Total failed price table refreshes"
    );
    describe_counter!(
        "signal_hub_invalid_prices_total",
        "Total stored prices skipped because the value was not a float"
    );

    // Bus
    describe_counter!(
        "signal_hub_publish_failures_total",
        "Total publishes dropped by the bus transport"
    );
    describe_counter!(
        "signal_hub_bus_lagged_messages_total",
        "Total messages lost by subscribers that fell behind the bus"
    );
    describe_counter!(
        "signal_hub_reconnects_total",
        "Total bus subscriptions re-established after a dropped connection"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for price table refresh modes.
#[derive(Debug, Clone, Copy)]
pub enum CacheMode {
    /// Periodic bulk read from the keyed store.
    Poll,
    /// Continuous consumption of the price topic.
    Stream,
}

impl CacheMode {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Stream => "stream",
        }
    }
}

/// Record a message received from the bus.
pub fn record_message_received(topic: Topic) {
    counter!(
        "signal_hub_messages_received_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// Record a payload that failed to decode.
pub fn record_decode_failure(topic: Topic) {
    counter!(
        "signal_hub_decode_failures_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// Record points emitted by the normalizer.
pub fn record_points_emitted(topic: Topic, count: u64) {
    counter!(
        "signal_hub_points_emitted_total",
        "measurement" => topic.measurement()
    )
    .increment(count);
}

/// Record a message suppressed for lack of a conversion price.
pub fn record_point_suppressed(topic: Topic) {
    counter!(
        "signal_hub_points_suppressed_total",
        "topic" => topic.name()
    )
    .increment(1);
}

/// Record a successful flush.
pub fn record_flush(points: u64, duration: Duration) {
    counter!("signal_hub_flushes_total").increment(1);
    counter!("signal_hub_flushed_points_total").increment(points);
    histogram!("signal_hub_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Record a failed batch write.
pub fn record_write_failure(points: u64) {
    counter!("signal_hub_write_failures_total").increment(1);
    counter!("signal_hub_flushed_points_total", "outcome" => "dropped").increment(points);
}

/// Update the price table size.
pub fn set_price_table_size(count: f64) {
    gauge!("signal_hub_price_table_symbols").set(count);
}

/// Record per-symbol price assignments.
pub fn record_price_updates(mode: CacheMode, count: u64) {
    counter!(
        "signal_hub_price_updates_total",
        "mode" => mode.as_str()
    )
    .increment(count);
}

/// Record a failed price table refresh.
pub fn record_price_refresh_failure(mode: CacheMode) {
    counter!(
        "signal_hub_price_refresh_failures_total",
        "mode" => mode.as_str()
    )
    .increment(1);
}

/// Record stored prices skipped for an unparsable value.
pub fn record_invalid_prices(count: u64) {
    counter!("signal_hub_invalid_prices_total").increment(count);
}

/// Record a publish dropped by the transport.
pub fn record_publish_failure(topic: &str) {
    counter!(
        "signal_hub_publish_failures_total",
        "topic" => topic.to_string()
    )
    .increment(1);
}

/// Record messages skipped by a lagging subscriber.
pub fn record_bus_lag(skipped: u64) {
    counter!("signal_hub_bus_lagged_messages_total").increment(skipped);
}

/// Record a subscription re-established after a dropped connection.
pub fn record_reconnect() {
    counter!("signal_hub_reconnects_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_mode_as_str() {
        assert_eq!(CacheMode::Poll.as_str(), "poll");
        assert_eq!(CacheMode::Stream.as_str(), "stream");
    }

    #[test]
    fn recording_without_recorder_is_a_noop() {
        record_message_received(Topic::GasPrice);
        record_flush(3, Duration::from_millis(5));
        set_price_table_size(2.0);
    }

    #[test]
    fn init_is_idempotent() {
        let _ = init_metrics();
        let handle = init_metrics();
        record_reconnect();
        record_bus_lag(3);
        record_invalid_prices(1);
        assert!(get_metrics_handle().is_some());

        let rendered = handle.render();
        assert!(rendered.contains("signal_hub_reconnects_total"));
        assert!(rendered.contains("signal_hub_bus_lagged_messages_total"));
        assert!(rendered.contains("signal_hub_invalid_prices_total"));
        assert!(!rendered.contains("topic=\"lagged\""));
    }
}
