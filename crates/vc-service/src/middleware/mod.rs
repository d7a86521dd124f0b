//! Middleware for the voice chat proxy.
//!
//! - `http_metrics` - HTTP request metrics

pub mod http_metrics;

pub use http_metrics::http_metrics_middleware;
