//! Liveness probe.

/// Handler for GET /health
///
/// The service has no backing store to check, so liveness is the answer.
pub async fn health_check() -> &'static str {
    "OK"
}
