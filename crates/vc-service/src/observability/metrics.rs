//! Metrics definitions for the voice chat proxy.
//!
//! All metrics follow Prometheus naming conventions:
//! - `vc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: known routes, everything else collapses to `/other`
//! - `action`: `StartVoiceChat`, `StopVoiceChat`, or `other`
//! - `status`: success, error, timeout
//! - `scene`: bounded by the scene files on disk

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return its render handle.
///
/// May only succeed once per process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Inbound HTTP, dominated by the upstream round trip
        .set_buckets_for_metric(
            Matcher::Prefix("vc_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("vc_upstream_call".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set upstream call buckets: {e}"))?
        // Token issuance is local CPU work
        .set_buckets_for_metric(
            Matcher::Prefix("vc_token_issuance".to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050],
        )
        .map_err(|e| format!("Failed to set token issuance buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `vc_http_requests_total`, `vc_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("vc_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("vc_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/proxy" => "/proxy",
        "/getScenes" => "/getScenes",
        "/health" => "/health",
        "/metrics" => "/metrics",
        _ => "/other",
    }
}

// ============================================================================
// Upstream Metrics
// ============================================================================

/// Record a signed upstream call
///
/// Metric: `vc_upstream_calls_total`, `vc_upstream_call_duration_seconds`
/// Labels: `action`, `status`
pub fn record_upstream_call(action: &str, status: &str, duration: Duration) {
    let action = normalize_action(action);

    histogram!("vc_upstream_call_duration_seconds",
        "action" => action,
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());

    counter!("vc_upstream_calls_total",
        "action" => action,
        "status" => status.to_string()
    )
    .increment(1);
}

fn normalize_action(action: &str) -> &'static str {
    match action {
        "StartVoiceChat" => "StartVoiceChat",
        "StopVoiceChat" => "StopVoiceChat",
        _ => "other",
    }
}

/// Record a stop request answered locally because no session was active
///
/// Metric: `vc_stop_short_circuits_total`
pub fn record_stop_short_circuit() {
    counter!("vc_stop_short_circuits_total").increment(1);
}

// ============================================================================
// Token & Session Metrics
// ============================================================================

/// Record access token issuance
///
/// Metric: `vc_token_issuance_total`, `vc_token_issuance_duration_seconds`
/// Labels: `status`
pub fn record_token_issuance(status: &str, duration: Duration) {
    histogram!("vc_token_issuance_duration_seconds", "status" => status.to_string())
        .record(duration.as_secs_f64());

    counter!("vc_token_issuance_total", "status" => status.to_string()).increment(1);
}

/// Record a freshly allocated session identity
///
/// Metric: `vc_session_allocations_total`
/// Labels: `scene`
pub fn record_session_allocation(scene_id: &str) {
    counter!("vc_session_allocations_total", "scene" => scene_id.to_string()).increment(1);
}
