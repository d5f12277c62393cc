//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus metrics recorder.
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Fails if another recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Connections dropped after a failed broadcast write (counter, labels: reason).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Batches broadcast by the message loop (counter).
pub const WDOM_BATCHES_SENT_TOTAL: &str = "wdom_batches_sent_total";
/// Messages broadcast by the message loop (counter).
pub const WDOM_MESSAGES_SENT_TOTAL: &str = "wdom_messages_sent_total";
/// Messages waiting in the outbound queue (gauge).
pub const WDOM_OUTBOUND_QUEUE_LEN: &str = "wdom_outbound_queue_len";
/// Inbound frames received (counter, labels: kind).
pub const WDOM_INBOUND_MESSAGES_TOTAL: &str = "wdom_inbound_messages_total";
/// Inbound frames rejected as malformed (counter).
pub const WDOM_MALFORMED_MESSAGES_TOTAL: &str = "wdom_malformed_messages_total";
/// Events for elements no longer in the tree (counter).
pub const WDOM_STALE_EVENTS_TOTAL: &str = "wdom_stale_events_total";
/// Responses for requests no longer pending (counter).
pub const WDOM_STALE_RESPONSES_TOTAL: &str = "wdom_stale_responses_total";
/// Event listeners that panicked (counter).
pub const WDOM_LISTENER_PANICS_TOTAL: &str = "wdom_listener_panics_total";
