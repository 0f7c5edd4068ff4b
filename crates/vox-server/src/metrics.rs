//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at process startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Inbound application payloads on a liveness-only transport (counter).
pub const WS_PROTOCOL_VIOLATIONS_TOTAL: &str = "ws_protocol_violations_total";
/// Active sessions in the hub registry (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Sessions evicted by the hub (counter, labels: reason).
pub const HUB_EVICTIONS_TOTAL: &str = "hub_evictions_total";
/// Announcements dropped for want of a live session (counter).
pub const HUB_DROPPED_ANNOUNCEMENTS_TOTAL: &str = "hub_dropped_announcements_total";
/// Synthesis RPC calls total (counter).
pub const SYNTHESIS_REQUESTS_TOTAL: &str = "synthesis_requests_total";
/// Synthesis RPC failures (counter, labels: `error_type`).
pub const SYNTHESIS_ERRORS_TOTAL: &str = "synthesis_errors_total";
/// Synthesis RPC duration seconds (histogram).
pub const SYNTHESIS_REQUEST_DURATION_SECONDS: &str = "synthesis_request_duration_seconds";
/// Dispatch retries after worker-reported overload (counter).
pub const DISPATCH_RETRIES_TOTAL: &str = "dispatch_retries_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_PROTOCOL_VIOLATIONS_TOTAL,
            SESSIONS_ACTIVE,
            HUB_EVICTIONS_TOTAL,
            HUB_DROPPED_ANNOUNCEMENTS_TOTAL,
            SYNTHESIS_REQUESTS_TOTAL,
            SYNTHESIS_ERRORS_TOTAL,
            SYNTHESIS_REQUEST_DURATION_SECONDS,
            DISPATCH_RETRIES_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
