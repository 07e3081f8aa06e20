//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup before
/// any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
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
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Broadcast drops total (counter, labels: reason).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Handshakes rejected total (counter).
pub const WS_HANDSHAKE_REJECTIONS_TOTAL: &str = "ws_handshake_rejections_total";
/// Live sessions (gauge).
pub const SESSIONS_ACTIVE: &str = "sessions_active";
/// Questions accepted total (counter).
pub const MESSAGES_RECEIVED_TOTAL: &str = "messages_received_total";
/// Frames rejected total (counter, labels: code).
pub const MESSAGES_REJECTED_TOTAL: &str = "messages_rejected_total";
/// Generation attempts total (counter). Recorded by `seance-spirit`.
pub const SPIRIT_GENERATION_ATTEMPTS_TOTAL: &str = "spirit_generation_attempts_total";
/// Fallback responses served (counter, labels: reason). Recorded by `seance-spirit`.
pub const SPIRIT_FALLBACKS_TOTAL: &str = "spirit_fallbacks_total";
/// Generation duration seconds (histogram). Recorded by `seance-spirit`.
pub const SPIRIT_GENERATION_DURATION_SECONDS: &str = "spirit_generation_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_global_install() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(WS_CONNECTIONS_TOTAL).increment(2);
        });
        let output = render(&handle);
        assert!(output.contains("ws_connections_total 2"));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_CONNECTION_DURATION_SECONDS,
            WS_BROADCAST_DROPS_TOTAL,
            WS_HANDSHAKE_REJECTIONS_TOTAL,
            SESSIONS_ACTIVE,
            MESSAGES_RECEIVED_TOTAL,
            MESSAGES_REJECTED_TOTAL,
            SPIRIT_GENERATION_ATTEMPTS_TOTAL,
            SPIRIT_FALLBACKS_TOTAL,
            SPIRIT_GENERATION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
