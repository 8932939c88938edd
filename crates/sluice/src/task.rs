//! Background task supervision
//!
//! Every producer and consumer owns a [`TaskSupervisor`]. Tasks spawned
//! through it share one cancellation signal, are joined on shutdown, and run
//! behind a failure boundary: a panicking task is logged and marks its owner
//! unhealthy instead of taking the process down.

use futures::FutureExt;
use parking_lot::Mutex;
use sluice_core::observe;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Cancellation signal handed to each supervised task
#[derive(Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolves once shutdown has been requested
    pub async fn cancelled(&mut self) {
        // A dropped sender also counts as shutdown
        let _ = self.0.wait_for(|stop| *stop).await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Owns the background tasks of one producer or consumer
pub struct TaskSupervisor {
    owner: String,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    healthy: Arc<AtomicBool>,
}

impl TaskSupervisor {
    pub fn new(owner: impl Into<String>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            owner: owner.into(),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Spawn a task that receives this supervisor's shutdown signal
    ///
    /// Panics inside the task are caught and logged, and the owner is marked
    /// unhealthy. Other tasks keep running.
    pub fn spawn<F, Fut>(&self, task: &'static str, f: F)
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let fut = f(ShutdownSignal(self.shutdown_tx.subscribe()));
        let healthy = self.healthy.clone();
        let owner = self.owner.clone();

        let handle = tokio::spawn(async move {
            if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                healthy.store(false, Ordering::SeqCst);
                observe::record_task_crash(task);
                tracing::error!(owner = %owner, task, "Background task panicked");
            }
        });

        self.handles.lock().push(handle);
    }

    /// Signal every task to stop and wait for all of them to exit
    ///
    /// Safe to call more than once; later calls return immediately.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(owner = %self.owner, error = %e, "Background task did not exit cleanly");
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// False once any supervised task has crashed
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn task_count(&self) -> usize {
        self.handles.lock().len()
    }
}

/// Polling interval that shortens after productive cycles
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveInterval {
    active: Duration,
    idle: Duration,
    current: Duration,
}

impl AdaptiveInterval {
    /// Starts idle
    pub fn new(active: Duration, idle: Duration) -> Self {
        Self {
            active,
            idle,
            current: idle,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record how much work the last cycle did and return the next wait
    pub fn record(&mut self, moved: u64) -> Duration {
        self.current = if moved > 0 { self.active } else { self.idle };
        self.current
    }
}
