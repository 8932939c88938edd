//! Consumer-group reader with handler dispatch
//!
//! A [`StreamConsumer`] reads its log through a consumer group, passes each
//! delivered entry to a [`MessageHandler`], and acknowledges the entry only
//! when the handler succeeds. Failed entries stay in the group's pending set.
//! A second background loop trims the log with the consumer's retention
//! profile.

use crate::cleanup::CleanupManager;
use crate::task::{ShutdownSignal, TaskSupervisor};
use async_trait::async_trait;
use parking_lot::Mutex;
use sluice_core::{
    error::{Result, SluiceError},
    observe, ConsumerConfig, Entry, LogStore,
};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wait after a failed group read before trying again
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const EMPTY_READ_IDLE: Duration = Duration::from_millis(50);

/// Callback invoked for every delivered entry
///
/// `Ok` acknowledges the entry; `Err` leaves it pending.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_message(&self, entry: &Entry) -> anyhow::Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Entry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle_message(&self, entry: &Entry) -> anyhow::Result<()> {
        (self.0)(entry.clone()).await
    }
}

/// Wrap an async closure as a [`MessageHandler`]
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(Entry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Lifecycle capability shared by consumers
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Spawn the read and cleanup loops
    fn start(&self) -> Result<()>;

    /// Cancel both loops and wait for them to exit. Idempotent.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    fn log_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Counts from one read-and-dispatch round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub delivered: u64,
    pub acked: u64,
    pub failed: u64,
}

struct Worker {
    store: Arc<dyn LogStore>,
    config: ConsumerConfig,
    handler: Arc<dyn MessageHandler>,
}

/// Consumer-group reader (Created → Running → Stopped)
///
/// A stopped consumer cannot be restarted; create a new one instead.
pub struct StreamConsumer {
    worker: Arc<Worker>,
    lifecycle: Mutex<Lifecycle>,
    tasks: TaskSupervisor,
}

impl StreamConsumer {
    /// Create a consumer in the Created state
    ///
    /// The group is created from the start of the log (and the log itself if
    /// absent). Failure to create it is logged, not returned.
    pub async fn new(
        store: Arc<dyn LogStore>,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        let config = config.normalized();
        crate::ensure_group(store.as_ref(), &config.log, &config.group).await;

        let tasks = TaskSupervisor::new(format!("consumer:{}", config.log));
        Self {
            worker: Arc::new(Worker {
                store,
                config,
                handler,
            }),
            lifecycle: Mutex::new(Lifecycle::Created),
            tasks,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.worker.config
    }

    /// Read one batch, dispatch it, and ack the successes
    pub async fn poll_once(&self) -> Result<ProcessStats> {
        self.worker.poll_once().await
    }
}

impl Worker {
    async fn poll_once(&self) -> Result<ProcessStats> {
        let config = &self.config;
        let entries = self
            .store
            .read_group(
                &config.log,
                &config.group,
                &config.consumer,
                config.read_count as usize,
                config.block_duration,
            )
            .await?;

        let mut stats = ProcessStats {
            delivered: entries.len() as u64,
            ..Default::default()
        };

        for entry in &entries {
            let started = Instant::now();
            let outcome = self.handler.handle_message(entry).await;
            observe::record_handled(started.elapsed(), outcome.is_ok());

            match outcome {
                Ok(()) => match self.store.ack(&config.log, &config.group, &[entry.id]).await {
                    Ok(n) => stats.acked += n,
                    Err(e) => {
                        tracing::error!(stream = %config.log, id = %entry.id, error = %e, "Failed to ack entry")
                    }
                },
                Err(e) => {
                    stats.failed += 1;
                    let failure = SluiceError::HandlerFailure {
                        entry_id: entry.id.to_string(),
                        reason: format!("{:#}", e),
                    };
                    tracing::warn!(stream = %config.log, error = %failure, "Entry left pending");
                }
            }
        }

        Ok(stats)
    }

    async fn run_reader(&self, mut shutdown: ShutdownSignal) {
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.poll_once() => result,
            };

            let pause = match result {
                Ok(stats) if stats.delivered > 0 => None,
                // Non-blocking reads return at once.
                Ok(_) if self.config.block_duration.is_zero() => Some(EMPTY_READ_IDLE),
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(stream = %self.config.log, error = %e, "Group read failed");
                    if matches!(e, SluiceError::GroupNotFound { .. }) {
                        crate::ensure_group(self.store.as_ref(), &self.config.log, &self.config.group)
                            .await;
                    }
                    Some(READ_ERROR_BACKOFF)
                }
            };

            match pause {
                Some(pause) => tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                },
                None => tokio::task::yield_now().await,
            }
        }

        tracing::debug!(stream = %self.config.log, "Read loop stopped");
    }
}

#[async_trait]
impl Consumer for StreamConsumer {
    fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => {
                return Err(SluiceError::InvalidState(format!(
                    "consumer for {} is already running",
                    self.worker.config.log
                )))
            }
            Lifecycle::Stopped => {
                return Err(SluiceError::InvalidState(format!(
                    "consumer for {} was stopped and cannot be restarted",
                    self.worker.config.log
                )))
            }
        }

        let worker = self.worker.clone();
        self.tasks.spawn("consumer_read", move |shutdown| async move {
            worker.run_reader(shutdown).await
        });

        let cleanup = CleanupManager::new(self.worker.store.clone());
        let cleanup_config = self.worker.config.cleanup_stream_config();
        self.tasks.spawn("consumer_cleanup", move |shutdown| async move {
            cleanup.run_periodic(cleanup_config, shutdown).await
        });

        *lifecycle = Lifecycle::Running;
        tracing::info!(
            stream = %self.worker.config.log,
            group = %self.worker.config.group,
            consumer = %self.worker.config.consumer,
            "Started consumer"
        );
        Ok(())
    }

    async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);
        if previous == Lifecycle::Running {
            tracing::info!(stream = %self.worker.config.log, "Stopping consumer");
        }
        self.tasks.shutdown().await;
    }

    fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running && self.tasks.is_healthy()
    }

    fn log_name(&self) -> &str {
        &self.worker.config.log
    }
}
