//! `rpcgate` server: HTTP transport, dispatch pipeline, built-in formats and
//! services, the handler chain, and usage counters.

pub mod app;
pub mod cli;
pub mod config;
pub mod counter;
pub mod dispatch;
pub mod formats;
pub mod handlers;
pub mod network;
pub mod services;
pub mod telemetry;
pub mod traits;

pub use app::App;
pub use config::ServerConfig;
pub use dispatch::{Dispatcher, RawRequest, Registries, RpcResponse};
pub use traits::{CallScope, Format, FormatError, Handler, Service, ServiceError};
