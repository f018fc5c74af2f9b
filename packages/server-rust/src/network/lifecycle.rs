//! Server lifecycle: the phase reported by the health endpoints and the
//! in-flight request count awaited during shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{info, warn};

/// Where the server is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Listener not bound yet.
    Starting,
    /// Accepting and serving requests.
    Serving,
    /// Shutdown requested; in-flight requests are finishing.
    Draining,
    Stopped,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared between the listener, the request handlers and the shutdown path.
pub struct Lifecycle {
    phase: ArcSwap<Phase>,
    in_flight: AtomicU64,
    idle: Notify,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            phase: ArcSwap::from_pointee(Phase::Starting),
            in_flight: AtomicU64::new(0),
            idle: Notify::new(),
            stop_tx,
            stop_rx,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        **self.phase.load()
    }

    pub fn set_phase(&self, phase: Phase) {
        let previous = *self.phase.swap(Arc::new(phase));
        if previous != phase {
            info!(from = previous.as_str(), to = phase.as_str(), "lifecycle phase changed");
        }
    }

    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.phase() == Phase::Serving
    }

    #[must_use]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Counts a request until the returned guard is dropped.
    #[must_use]
    pub fn track(self: &Arc<Self>) -> RequestGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            lifecycle: Arc::clone(self),
        }
    }

    /// Moves to [`Phase::Draining`] and wakes everything waiting on
    /// [`stopped`](Self::stopped).
    pub fn request_stop(&self) {
        self.set_phase(Phase::Draining);
        self.stop_tx.send_replace(true);
    }

    /// Resolves once [`request_stop`](Self::request_stop) has been called.
    pub async fn stopped(&self) {
        let mut rx = self.stop_rx.clone();
        // Only fails when the sender is dropped, which `self` prevents.
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Waits until no request is in flight or `timeout` elapses, then moves
    /// to [`Phase::Stopped`]. Returns whether every request finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let drained = loop {
            let idle = self.idle.notified();
            if self.in_flight() == 0 {
                break true;
            }
            if tokio::time::timeout_at(deadline, idle).await.is_err() {
                break self.in_flight() == 0;
            }
        };
        if !drained {
            warn!(remaining = self.in_flight(), "drain timed out with requests in flight");
        }
        self.set_phase(Phase::Stopped);
        drained
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop.
pub struct RequestGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if self.lifecycle.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.lifecycle.idle.notify_waiters();
        }
    }
}
