//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded; a second install
/// fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Inbound events dispatched (counter, labels: event).
pub const SYNC_EVENTS_TOTAL: &str = "sync_events_total";
/// Inbound events that were dropped, failed or panicked (counter, labels: event, code).
pub const SYNC_EVENT_ERRORS_TOTAL: &str = "sync_event_errors_total";
/// Handler duration seconds (histogram, labels: event).
pub const SYNC_EVENT_DURATION_SECONDS: &str = "sync_event_duration_seconds";
/// Frames dropped because they did not decode (counter, labels: cluster).
pub const SYNC_FRAMES_MALFORMED_TOTAL: &str = "sync_frames_malformed_total";
/// Outbound frames dropped on a full or closed queue (counter, labels: cluster).
pub const SYNC_FRAMES_DROPPED_TOTAL: &str = "sync_frames_dropped_total";
/// Open cluster channels (gauge).
pub const SYNC_CHANNELS_OPEN: &str = "sync_channels_open";
/// Broadcast recipients that could not be reached (counter, labels: event).
pub const SYNC_BROADCAST_FAILURES_TOTAL: &str = "sync_broadcast_failures_total";
/// Connect attempts (counter, labels: outcome).
pub const SYNC_CONNECT_TOTAL: &str = "sync_connect_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = render(&handle);
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            SYNC_EVENTS_TOTAL,
            SYNC_EVENT_ERRORS_TOTAL,
            SYNC_EVENT_DURATION_SECONDS,
            SYNC_FRAMES_MALFORMED_TOTAL,
            SYNC_FRAMES_DROPPED_TOTAL,
            SYNC_CHANNELS_OPEN,
            SYNC_BROADCAST_FAILURES_TOTAL,
            SYNC_CONNECT_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
            assert!(name.starts_with("sync_"));
        }
    }
}
