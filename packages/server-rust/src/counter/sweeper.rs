//! Background purge of expired counters.
//!
//! A generic `BackgroundWorker<R>` drives a `BackgroundRunnable` from an mpsc
//! channel and a periodic tick. [`ExpirySweep`] is the runnable that keeps the
//! in-memory store from accumulating hourly keys nobody reads again.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use super::memory::MemoryCounterStore;

/// Work executed by a [`BackgroundWorker`].
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    type Task: Send + 'static;

    /// Process one submitted task.
    async fn run(&mut self, task: Self::Task);

    /// Called on every tick. Default is a no-op.
    async fn on_tick(&mut self) {}

    /// Called once when the worker stops. Default is a no-op.
    async fn shutdown(&mut self) {}
}

/// Tasks accepted by [`ExpirySweep`].
#[derive(Debug)]
pub enum SweepTask {
    /// Purge immediately, reporting the number of removed entries.
    RunNow { done: Option<oneshot::Sender<usize>> },
}

/// Purges expired entries from a [`MemoryCounterStore`] on every tick.
pub struct ExpirySweep {
    store: Arc<MemoryCounterStore>,
}

impl ExpirySweep {
    #[must_use]
    pub fn new(store: Arc<MemoryCounterStore>) -> Self {
        Self { store }
    }

    fn sweep(&self) -> usize {
        let removed = self.store.purge_expired();
        if removed > 0 {
            debug!(removed, remaining = self.store.len(), "purged expired counters");
        }
        removed
    }
}

#[async_trait]
impl BackgroundRunnable for ExpirySweep {
    type Task = SweepTask;

    async fn run(&mut self, task: SweepTask) {
        match task {
            SweepTask::RunNow { done } => {
                let removed = self.sweep();
                if let Some(done) = done {
                    let _ = done.send(removed);
                }
            }
        }
    }

    async fn on_tick(&mut self) {
        self.sweep();
    }
}

/// Runs a [`BackgroundRunnable`] on a spawned tokio task.
///
/// The loop selects over submitted tasks, the tick interval and the stop
/// signal. Dropping the channel or calling [`BackgroundWorker::stop`] ends it,
/// after which `shutdown()` runs once.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Spawns the worker. Channel capacity is 64.
    pub fn start(mut runnable: R, tick_interval: std::time::Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(64);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick_interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    task = rx.recv() => match task {
                        Some(task) => runnable.run(task).await,
                        None => break,
                    },
                    _ = ticker.tick() => runnable.on_tick().await,
                    _ = &mut stop_rx => break,
                }
            }

            runnable.shutdown().await;
        });

        Self {
            tx: Some(tx),
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Submits a task.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker has been stopped.
    pub async fn submit(&self, task: R::Task) -> anyhow::Result<()> {
        match &self.tx {
            Some(tx) => tx
                .send(task)
                .await
                .map_err(|_| anyhow::anyhow!("worker channel closed")),
            None => Err(anyhow::anyhow!("worker not running")),
        }
    }

    /// Stops the worker and waits for it to finish.
    pub async fn stop(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
