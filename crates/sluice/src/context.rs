use crate::manager::StreamManager;
use sluice_core::{
    error::{Result, SluiceError},
    Appended, Fields, LogStore,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Application-owned entry point to the stream layer
///
/// Holds the one [`StreamManager`] for the process. [`init`](Self::init)
/// checks the store once and enables the manager; repeated or concurrent
/// calls never initialize twice.
pub struct StreamContext {
    manager: Arc<StreamManager>,
    state: AtomicU8,
}

impl StreamContext {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            manager: Arc::new(StreamManager::new(store)),
            state: AtomicU8::new(UNINITIALIZED),
        }
    }

    /// Initialize the stream layer
    ///
    /// Returns `true` for the call that performed initialization and
    /// `false` for every other one, including calls made while another
    /// initialization is in flight. The manager becomes available only once
    /// the store check succeeds; a failed check leaves the context
    /// uninitialized so the call can be retried.
    pub async fn init(&self) -> Result<bool> {
        if self
            .state
            .compare_exchange(UNINITIALIZED, INITIALIZING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(false);
        }

        if let Err(e) = self.manager.store().ping().await {
            self.state.store(UNINITIALIZED, Ordering::SeqCst);
            tracing::error!(error = %e, "Stream layer initialization failed");
            return Err(e);
        }

        self.state.store(READY, Ordering::SeqCst);
        tracing::info!("Stream layer initialized");
        Ok(true)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::SeqCst) == READY
    }

    pub fn manager(&self) -> Result<&Arc<StreamManager>> {
        if !self.is_initialized() {
            return Err(SluiceError::NotInitialized);
        }
        Ok(&self.manager)
    }

    /// Emit a message through a named producer
    pub async fn add_message(&self, producer: &str, fields: Fields) -> Result<Appended> {
        self.manager()?.add_message(producer, fields).await
    }

    /// Stop every registered consumer and producer
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        tracing::info!("Stream layer shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_memory::{MemoryLogStore, StoreOp};

    #[tokio::test]
    async fn test_init_runs_once() {
        let store = Arc::new(MemoryLogStore::new());
        let ctx = StreamContext::new(store.clone());

        assert!(matches!(ctx.manager(), Err(SluiceError::NotInitialized)));
        assert!(ctx.init().await.unwrap());
        assert!(!ctx.init().await.unwrap());
        assert_eq!(store.op_count(StoreOp::Ping), 1);
        assert!(ctx.manager().is_ok());
    }

    #[tokio::test]
    async fn test_failed_init_can_retry() {
        let store = Arc::new(MemoryLogStore::new());
        let ctx = StreamContext::new(store.clone());

        store.set_available(false);
        assert!(ctx.init().await.is_err());
        assert!(!ctx.is_initialized());

        store.set_available(true);
        assert!(ctx.init().await.unwrap());
    }

    #[tokio::test]
    async fn test_manager_unavailable_while_store_check_in_flight() {
        let store = Arc::new(MemoryLogStore::new());
        let ctx = StreamContext::new(store.clone());
        store.set_available(false);

        ctx.state.store(INITIALIZING, Ordering::SeqCst);
        assert!(!ctx.init().await.unwrap());
        assert!(!ctx.is_initialized());
        assert!(matches!(ctx.manager(), Err(SluiceError::NotInitialized)));
        assert_eq!(store.op_count(StoreOp::Ping), 0);

        ctx.state.store(UNINITIALIZED, Ordering::SeqCst);
        assert!(ctx.init().await.is_err());
        assert!(matches!(ctx.manager(), Err(SluiceError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_concurrent_init_initializes_once() {
        let ctx = Arc::new(StreamContext::new(Arc::new(MemoryLogStore::new())));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.init().await.unwrap() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
