//! Service layer for the voice chat proxy.
//!
//! # Components
//!
//! - `action_proxy` - StartVoiceChat/StopVoiceChat state machine and passthrough
//! - `scene_lister` - scene listing with freshly issued join tokens
//! - `upstream` - signed HTTP transport to the upstream OpenAPI

pub mod action_proxy;
pub mod scene_lister;
pub mod upstream;

pub use action_proxy::{ActionProxy, ProxyOutcome};
pub use scene_lister::SceneLister;
pub use upstream::{HttpUpstream, UpstreamSettings, UpstreamTransport};
// Mock upstream for testing (exposed for integration tests)
#[allow(unused_imports)]
pub use upstream::mock::MockUpstream;
