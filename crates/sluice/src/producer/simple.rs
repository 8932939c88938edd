use super::Producer;
use crate::cleanup::CleanupManager;
use crate::task::TaskSupervisor;
use async_trait::async_trait;
use sluice_core::{error::Result, Appended, Fields, LogStore, StreamConfig};
use std::sync::Arc;

/// Producer that always appends to its own log
pub struct SimpleProducer {
    store: Arc<dyn LogStore>,
    config: StreamConfig,
    tasks: TaskSupervisor,
}

impl SimpleProducer {
    /// Create the producer and start its cleanup loop
    ///
    /// The consumer group is created up front (with the log if needed);
    /// failure to do so is logged, not returned.
    pub async fn start(store: Arc<dyn LogStore>, config: StreamConfig) -> Self {
        let config = config.normalized();
        crate::ensure_group(store.as_ref(), &config.name, &config.group).await;

        let tasks = TaskSupervisor::new(format!("producer:{}", config.name));
        let cleanup = CleanupManager::new(store.clone());
        let cleanup_config = config.clone();
        tasks.spawn("producer_cleanup", move |shutdown| async move {
            cleanup.run_periodic(cleanup_config, shutdown).await
        });

        tracing::info!(stream = %config.name, "Started simple producer");

        Self {
            store,
            config,
            tasks,
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

#[async_trait]
impl Producer for SimpleProducer {
    async fn add_message(&self, fields: Fields) -> Result<Appended> {
        let id = self
            .store
            .append(&self.config.name, &fields)
            .await
            .inspect_err(|e| {
                tracing::error!(stream = %self.config.name, error = %e, "Failed to append message")
            })?;

        Ok(Appended {
            log: self.config.name.clone(),
            id,
        })
    }

    fn log_name(&self) -> &str {
        &self.config.name
    }

    async fn stop(&self) {
        if !self.tasks.is_shutdown() {
            tracing::info!(stream = %self.config.name, "Stopping simple producer");
        }
        self.tasks.shutdown().await;
    }

    fn is_running(&self) -> bool {
        !self.tasks.is_shutdown() && self.tasks.is_healthy()
    }
}
