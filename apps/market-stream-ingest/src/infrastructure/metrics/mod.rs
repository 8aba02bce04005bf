//! Prometheus Metrics Module
//!
//! Exposes ingest metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Messages**: Vendor messages received and parse failures per frequency
//! - **Connections**: Channel state and reconnect attempts
//! - **Routing**: Routed outcomes per frequency
//! - **Distribution**: Published events, buffer evictions, bus failures
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{ConnectionState, FrequencyKind};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling it again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
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
    // Inbound
    describe_counter!(
        "stream_ingest_messages_received_total",
        "Data messages received from vendor channels"
    );
    describe_counter!(
        "stream_ingest_parse_errors_total",
        "Frames or elements that failed to decode"
    );

    // Connections
    describe_gauge!(
        "stream_ingest_channel_live",
        "1 when the channel is streaming, 0 otherwise"
    );
    describe_counter!(
        "stream_ingest_state_transitions_total",
        "Channel state transitions by target state"
    );
    describe_counter!(
        "stream_ingest_reconnects_total",
        "Reconnection attempts scheduled"
    );
    describe_gauge!(
        "stream_ingest_subscriptions",
        "Symbols subscribed per channel"
    );

    // Routing
    describe_counter!(
        "stream_ingest_routed_total",
        "Routing outcomes by frequency"
    );
    describe_histogram!(
        "stream_ingest_processing_seconds",
        "Time spent in the frequency processor"
    );

    // Distribution
    describe_counter!(
        "stream_ingest_published_total",
        "Events accepted by the publisher"
    );
    describe_counter!(
        "stream_ingest_buffer_evictions_total",
        "Events evicted from the full buffer"
    );
    describe_counter!(
        "stream_ingest_bus_errors_total",
        "Failed distribution bus publishes"
    );
    describe_gauge!("stream_ingest_buffered_events", "Events currently buffered");
    describe_gauge!(
        "stream_ingest_throughput_events_per_second",
        "Published events per second over the last stats interval"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for routed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Processor accepted the event.
    Success,
    /// Processor failed, panicked, or the event was malformed.
    Error,
    /// No processor registered.
    Unrouted,
}

impl RouteOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Unrouted => "unrouted",
        }
    }
}

/// Record a data message received on a channel.
pub fn record_message_received(frequency: FrequencyKind, event_code: &'static str) {
    counter!(
        "stream_ingest_messages_received_total",
        "frequency" => frequency.as_str(),
        "event" => event_code
    )
    .increment(1);
}

/// Record a frame or element that failed to decode.
pub fn record_parse_error(frequency: FrequencyKind) {
    counter!(
        "stream_ingest_parse_errors_total",
        "frequency" => frequency.as_str()
    )
    .increment(1);
}

/// Record a channel state transition.
pub fn record_connection_state(frequency: FrequencyKind, state: ConnectionState) {
    counter!(
        "stream_ingest_state_transitions_total",
        "frequency" => frequency.as_str(),
        "state" => state.as_str()
    )
    .increment(1);
    gauge!(
        "stream_ingest_channel_live",
        "frequency" => frequency.as_str()
    )
    .set(if state.is_live() { 1.0 } else { 0.0 });
}

/// Record a scheduled reconnection attempt.
pub fn record_reconnect(frequency: FrequencyKind) {
    counter!(
        "stream_ingest_reconnects_total",
        "frequency" => frequency.as_str()
    )
    .increment(1);
}

/// Update the subscribed symbol count for a channel.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscriptions(frequency: FrequencyKind, count: usize) {
    gauge!(
        "stream_ingest_subscriptions",
        "frequency" => frequency.as_str()
    )
    .set(count as f64);
}

/// Record a routing outcome.
pub fn record_routed(frequency: FrequencyKind, outcome: RouteOutcome) {
    counter!(
        "stream_ingest_routed_total",
        "frequency" => frequency.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record time spent in a processor.
pub fn record_processing_duration(frequency: FrequencyKind, duration: Duration) {
    histogram!(
        "stream_ingest_processing_seconds",
        "frequency" => frequency.as_str()
    )
    .record(duration.as_secs_f64());
}

/// Record an event accepted by the publisher.
pub fn record_published(frequency: FrequencyKind) {
    counter!(
        "stream_ingest_published_total",
        "frequency" => frequency.as_str()
    )
    .increment(1);
}

/// Record an event evicted from the full buffer.
pub fn record_buffer_eviction() {
    counter!("stream_ingest_buffer_evictions_total").increment(1);
}

/// Record a failed bus publish.
pub fn record_bus_error() {
    counter!("stream_ingest_bus_errors_total").increment(1);
}

/// Update buffer occupancy and throughput gauges.
#[allow(clippy::cast_precision_loss)]
pub fn set_publisher_gauges(buffered: usize, events_per_second: f64) {
    gauge!("stream_ingest_buffered_events").set(buffered as f64);
    gauge!("stream_ingest_throughput_events_per_second").set(events_per_second);
}

// =============================================================================
// Tests
// =============================================================================
