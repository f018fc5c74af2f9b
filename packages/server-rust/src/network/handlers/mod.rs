//! axum handlers and the state they share.

pub mod health;
pub mod rpc;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use rpc::rpc_handler;

use std::sync::Arc;
use std::time::Instant;

use super::Lifecycle;
use crate::dispatch::Dispatcher;

/// State carried through axum extractors. Cloning copies `Arc`s only.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub lifecycle: Arc<Lifecycle>,
    /// Largest request body read into memory.
    pub body_limit: usize,
    pub start_time: Instant,
}
