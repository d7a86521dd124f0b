//! HTTP request handlers for the voice chat proxy.

pub mod health;
pub mod metrics;
pub mod proxy;
pub mod scenes;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use proxy::proxy_action;
pub use scenes::get_scenes;
