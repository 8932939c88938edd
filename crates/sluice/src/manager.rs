//! Named registry of producers and consumers

use crate::consumer::{Consumer, MessageHandler, StreamConsumer};
use crate::producer::{BackupProducer, Producer, SimpleProducer};
use sluice_core::{
    error::{Result, SluiceError},
    Appended, BackupStreamConfig, ConsumerConfig, Fields, LogStore, StreamConfig,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns the lifecycle of every producer and consumer in the process
///
/// Names are unique per kind. Removing an entry stops it first; shutting
/// the manager down stops all consumers, then all producers, and refuses any
/// further registrations.
pub struct StreamManager {
    store: Arc<dyn LogStore>,
    producers: RwLock<HashMap<String, Arc<dyn Producer>>>,
    consumers: RwLock<HashMap<String, Arc<dyn Consumer>>>,
    closed: AtomicBool,
}

impl StreamManager {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            producers: RwLock::new(HashMap::new()),
            consumers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<dyn LogStore> {
        &self.store
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(SluiceError::Shutdown);
        }
        Ok(())
    }

    // ---- Producers ----

    pub async fn create_simple_producer(
        &self,
        name: &str,
        config: StreamConfig,
    ) -> Result<Arc<dyn Producer>> {
        let mut producers = self.producers.write().await;
        self.check_new_producer(&producers, name)?;

        let producer: Arc<dyn Producer> =
            Arc::new(SimpleProducer::start(self.store.clone(), config).await);
        producers.insert(name.to_string(), producer.clone());

        tracing::info!(producer = %name, stream = %producer.log_name(), "Registered simple producer");
        Ok(producer)
    }

    pub async fn create_backup_producer(
        &self,
        name: &str,
        config: BackupStreamConfig,
    ) -> Result<Arc<dyn Producer>> {
        let mut producers = self.producers.write().await;
        self.check_new_producer(&producers, name)?;

        let producer: Arc<dyn Producer> =
            Arc::new(BackupProducer::start(self.store.clone(), config).await);
        producers.insert(name.to_string(), producer.clone());

        tracing::info!(producer = %name, stream = %producer.log_name(), "Registered backup producer");
        Ok(producer)
    }

    /// Register an already constructed producer
    pub async fn register_producer(&self, name: &str, producer: Arc<dyn Producer>) -> Result<()> {
        let mut producers = self.producers.write().await;
        self.check_new_producer(&producers, name)?;
        producers.insert(name.to_string(), producer);
        Ok(())
    }

    fn check_new_producer(
        &self,
        producers: &HashMap<String, Arc<dyn Producer>>,
        name: &str,
    ) -> Result<()> {
        self.ensure_open()?;
        if producers.contains_key(name) {
            return Err(SluiceError::NameConflict {
                kind: "producer",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub async fn producer(&self, name: &str) -> Result<Arc<dyn Producer>> {
        self.producers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SluiceError::NotFound {
                kind: "producer",
                name: name.to_string(),
            })
    }

    /// Stop a producer and remove it from the registry
    pub async fn remove_producer(&self, name: &str) -> Result<()> {
        let mut producers = self.producers.write().await;
        let producer = producers
            .get(name)
            .cloned()
            .ok_or_else(|| SluiceError::NotFound {
                kind: "producer",
                name: name.to_string(),
            })?;

        producer.stop().await;
        producers.remove(name);

        tracing::info!(producer = %name, "Removed producer");
        Ok(())
    }

    pub async fn list_producers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.producers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Send a message through a named producer
    pub async fn add_message(&self, producer: &str, fields: Fields) -> Result<Appended> {
        self.producer(producer).await?.add_message(fields).await
    }

    // ---- Consumers ----

    /// Create and register a consumer without starting it
    pub async fn create_consumer(
        &self,
        name: &str,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Arc<dyn Consumer>> {
        let mut consumers = self.consumers.write().await;
        self.ensure_open()?;
        if consumers.contains_key(name) {
            return Err(SluiceError::NameConflict {
                kind: "consumer",
                name: name.to_string(),
            });
        }

        let consumer: Arc<dyn Consumer> =
            Arc::new(StreamConsumer::new(self.store.clone(), config, handler).await);
        consumers.insert(name.to_string(), consumer.clone());

        tracing::info!(consumer = %name, stream = %consumer.log_name(), "Registered consumer");
        Ok(consumer)
    }

    pub async fn consumer(&self, name: &str) -> Result<Arc<dyn Consumer>> {
        self.consumers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| SluiceError::NotFound {
                kind: "consumer",
                name: name.to_string(),
            })
    }

    pub async fn start_consumer(&self, name: &str) -> Result<()> {
        self.consumer(name).await?.start()
    }

    pub async fn stop_consumer(&self, name: &str) -> Result<()> {
        self.consumer(name).await?.stop().await;
        Ok(())
    }

    /// Stop a consumer and remove it from the registry
    pub async fn remove_consumer(&self, name: &str) -> Result<()> {
        let mut consumers = self.consumers.write().await;
        let consumer = consumers
            .get(name)
            .cloned()
            .ok_or_else(|| SluiceError::NotFound {
                kind: "consumer",
                name: name.to_string(),
            })?;

        consumer.stop().await;
        consumers.remove(name);

        tracing::info!(consumer = %name, "Removed consumer");
        Ok(())
    }

    pub async fn list_consumers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.consumers.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    // ---- Convenience constructors with default configs ----

    /// Create and start a consumer on `log` with default settings
    pub async fn init_consumer_with_handler(
        &self,
        name: &str,
        log: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        self.create_custom_consumer(name, ConsumerConfig::new(log), handler, true)
            .await
    }

    /// Create a consumer with a custom config, optionally starting it
    pub async fn create_custom_consumer(
        &self,
        name: &str,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
        auto_start: bool,
    ) -> Result<()> {
        let consumer = self.create_consumer(name, config, handler).await?;
        if auto_start {
            consumer.start()?;
        }
        Ok(())
    }

    pub async fn create_simple_stream_producer(&self, name: &str, log: &str) -> Result<()> {
        self.create_simple_producer(name, StreamConfig::new(log))
            .await
            .map(|_| ())
    }

    pub async fn create_backup_stream_producer(&self, name: &str, log: &str) -> Result<()> {
        self.create_backup_producer(name, BackupStreamConfig::new(log))
            .await
            .map(|_| ())
    }

    // ---- Shutdown ----

    /// Stop every consumer, then every producer
    ///
    /// Terminal: later calls return immediately and new registrations fail
    /// with [`SluiceError::Shutdown`].
    pub async fn shutdown(&self) {
        // Take the locks first so no creation can slip in after the flag flips
        let mut consumers = self.consumers.write().await;
        let mut producers = self.producers.write().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            consumers = consumers.len(),
            producers = producers.len(),
            "Shutting down stream manager"
        );

        for (name, consumer) in consumers.drain() {
            consumer.stop().await;
            tracing::debug!(consumer = %name, "Consumer stopped");
        }
        for (name, producer) in producers.drain() {
            producer.stop().await;
            tracing::debug!(producer = %name, "Producer stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::handler_fn;
    use sluice_core::{fields, Entry};
    use sluice_memory::MemoryLogStore;

    fn manager() -> StreamManager {
        StreamManager::new(Arc::new(MemoryLogStore::new()))
    }

    fn noop() -> Arc<dyn MessageHandler> {
        handler_fn(|_entry: Entry| async { Ok::<(), anyhow::Error>(()) })
    }

    #[tokio::test]
    async fn test_duplicate_names_conflict() {
        let mgr = manager();
        mgr.create_simple_stream_producer("p", "events").await.unwrap();

        let err = mgr
            .create_backup_stream_producer("p", "other")
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::NameConflict { kind: "producer", .. }));

        mgr.create_custom_consumer("c", ConsumerConfig::new("events"), noop(), false)
            .await
            .unwrap();
        let err = mgr
            .init_consumer_with_handler("c", "events", noop())
            .await
            .unwrap_err();
        assert!(matches!(err, SluiceError::NameConflict { kind: "consumer", .. }));

        mgr.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_stops_then_evicts() {
        let mgr = manager();
        mgr.init_consumer_with_handler("c", "events", noop())
            .await
            .unwrap();
        let consumer = mgr.consumer("c").await.unwrap();
        assert!(consumer.is_running());

        mgr.remove_consumer("c").await.unwrap();
        assert!(!consumer.is_running());
        assert!(mgr.list_consumers().await.is_empty());
        assert!(matches!(
            mgr.remove_consumer("c").await,
            Err(SluiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_add_message_by_name() {
        let mgr = manager();
        mgr.create_simple_stream_producer("p", "events").await.unwrap();

        let appended = mgr
            .add_message("p", fields! { "kind" => "signup" })
            .await
            .unwrap();
        assert_eq!(appended.log, "events");
        assert!(matches!(
            mgr.add_message("missing", fields! {}).await,
            Err(SluiceError::NotFound { .. })
        ));

        mgr.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_terminal() {
        let mgr = manager();
        mgr.create_simple_stream_producer("p", "events").await.unwrap();
        mgr.init_consumer_with_handler("c", "events", noop())
            .await
            .unwrap();
        let producer = mgr.producer("p").await.unwrap();
        let consumer = mgr.consumer("c").await.unwrap();

        mgr.shutdown().await;
        mgr.shutdown().await;

        assert!(!producer.is_running());
        assert!(!consumer.is_running());
        assert!(mgr.list_producers().await.is_empty());
        assert!(matches!(
            mgr.create_simple_stream_producer("q", "events").await,
            Err(SluiceError::Shutdown)
        ));
    }
}
