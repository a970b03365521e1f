//! Prometheus metrics
//!
//! Side-effect sink for the authorization pipeline and its collaborators.
//! Recording is append-only and never blocks or alters a decision outcome;
//! all counters and gauges are safe under concurrent update.

use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use telemetry_metrics::{counter, gauge, histogram};

use crate::{Error, Result};

/// Install the Prometheus recorder and return the render handle.
///
/// Call once at startup; the handle backs the `/metrics` endpoint.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))
}

/// Record a successful device enrollment.
pub fn record_device_enrollment() {
    counter!("edgemesh_device_enrollments_total").increment(1);
    gauge!("edgemesh_devices_total", "status" => "active").increment(1.0);
}

/// Record an authorization decision and its wall-clock latency.
pub fn record_authorization_decision(allowed: bool, latency: Duration) {
    let decision = if allowed { "allow" } else { "deny" };
    counter!("edgemesh_authorization_decisions_total", "decision" => decision).increment(1);
    histogram!("edgemesh_authorization_latency_seconds").record(latency.as_secs_f64());
}

/// Record a connection request outcome.
pub fn record_connection_request(service: &str, authorized: bool) {
    let status = if authorized { "authorized" } else { "denied" };
    counter!(
        "edgemesh_connections_total",
        "service" => service.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Mark a service's active-connection gauge up. Called only after the
/// connection row is committed, so the gauge never counts a grant that
/// failed to persist.
pub fn record_connection_established(service: &str) {
    gauge!("edgemesh_connections_active", "service" => service.to_string()).increment(1.0);
}

/// Record a connection termination, marking the service's active-connection
/// gauge down. Called exactly once per terminated connection.
pub fn record_connection_terminated(service: &str) {
    gauge!("edgemesh_connections_active", "service" => service.to_string()).decrement(1.0);
}

/// Record a received health report.
pub fn record_health_check() {
    counter!("edgemesh_health_checks_total").increment(1);
}
