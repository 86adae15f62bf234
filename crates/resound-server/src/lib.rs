//! HTTP API server for the resound fingerprint matching engine
//!
//! Exposes the catalog and search operations over the `/v1/priv` JSON API,
//! with pluggable authentication, Prometheus metrics at `/_metrics` and a
//! drain-aware health gate at `/_health`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod metrics;
pub mod server;
pub mod state;

pub use config::{database_url_from_env, normalize_bind, ServerConfig};
pub use server::{build_router, run};
pub use state::AppState;
