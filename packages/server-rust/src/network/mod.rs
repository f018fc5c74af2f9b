//! HTTP transport: listener, middleware, health endpoints and the RPC fallback route.

pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod middleware;
pub mod module;

pub use config::{NetworkConfig, TlsConfig};
pub use handlers::AppState;
pub use lifecycle::{Lifecycle, Phase, RequestGuard};
pub use module::NetworkModule;
