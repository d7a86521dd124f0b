//! Voice Chat Proxy Service Library
//!
//! A small HTTP service that sits between browser clients and the RTC
//! OpenAPI, responsible for:
//!
//! - Issuing RTC access tokens for per-scene rooms
//! - Signing and forwarding StartVoiceChat/StopVoiceChat calls
//! - Remembering the active room/user identity for each scene
//!
//! # Architecture
//!
//! Handler -> Service -> Repository:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//!                                        |
//!                                        +-> crypto/{access_token,signer}.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Environment configuration and the credentials file
//! - `crypto` - Access tokens and request signatures
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Scene, session and wire types
//! - `observability` - Metrics and log correlation helpers
//! - `repositories` - Scene registry and session store
//! - `routes` - Axum router setup
//! - `services` - Action proxy, scene lister, upstream transport

pub mod config;
pub mod crypto;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
