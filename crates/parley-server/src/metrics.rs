//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections admitted total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrade attempts refused by the session gate (counter, labels: code).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Inbound frames dropped (counter, labels: reason).
pub const WS_FRAMES_DROPPED_TOTAL: &str = "ws_frames_dropped_total";
/// Connections dropped for a full outbound queue (counter).
pub const WS_BACKPRESSURE_DROPS_TOTAL: &str = "ws_backpressure_drops_total";
/// Events processed by the dispatcher (counter, labels: type).
pub const EVENTS_DISPATCHED_TOTAL: &str = "events_dispatched_total";
/// Frames enqueued across all recipients (counter).
pub const EVENT_RECIPIENTS_TOTAL: &str = "event_recipients_total";
/// Handler execution time (histogram, labels: type).
pub const HANDLER_DURATION_SECONDS: &str = "handler_duration_seconds";
