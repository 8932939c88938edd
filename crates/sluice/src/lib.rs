//! # Sluice
//!
//! Resilient producers and consumers over a shared append-only log store.
//!
//! Sluice provides:
//! - Producers that fail over to a backup log when the primary's consumer
//!   group is saturated, and drain the backlog back when capacity frees up
//! - Consumer-group readers with at-least-once handler dispatch
//! - Continuous trimming that never removes unacknowledged or protected
//!   entries
//! - A cross-instance advisory lock on TTL keys
//! - A named registry that owns the lifecycle of every producer and consumer
//!
//! ## Example
//!
//! ```rust,no_run
//! use sluice::prelude::*;
//! use sluice_memory::MemoryLogStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> sluice::Result<()> {
//! let ctx = StreamContext::new(Arc::new(MemoryLogStore::new()));
//! ctx.init().await?;
//!
//! let manager = ctx.manager()?;
//! manager.create_backup_stream_producer("orders", "orders").await?;
//! manager
//!     .init_consumer_with_handler(
//!         "order-worker",
//!         "orders",
//!         handler_fn(|entry: Entry| async move {
//!             println!("order {}: {:?}", entry.id, entry.fields);
//!             Ok::<(), anyhow::Error>(())
//!         }),
//!     )
//!     .await?;
//!
//! ctx.add_message("orders", fields! { "sku" => "A-100", "qty" => 2 })
//!     .await?;
//!
//! ctx.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod consumer;
pub mod context;
pub mod lock;
pub mod manager;
pub mod prelude;
pub mod producer;
pub mod task;

pub use cleanup::{CleanupManager, CleanupReport, TrimBoundary, TrimCandidates};
pub use consumer::{handler_fn, Consumer, MessageHandler, ProcessStats, StreamConsumer};
pub use context::StreamContext;
pub use lock::{DistributedLock, LockLease, ROUTE_LOCK_TTL};
pub use manager::StreamManager;
pub use producer::{
    BackupCache, BackupProducer, Producer, Route, RouteDecision, RouteReason, SimpleProducer,
};
pub use sluice_core::{Result, SluiceError};
pub use task::{AdaptiveInterval, ShutdownSignal, TaskSupervisor};

use sluice_core::{EntryId, LogStore};

/// Create `group` on `log` from the beginning, creating the log if needed
///
/// Failure is logged and otherwise ignored; reads will surface the problem.
pub(crate) async fn ensure_group(store: &dyn LogStore, log: &str, group: &str) {
    match store.create_group(log, group, EntryId::MIN).await {
        Ok(true) => tracing::debug!(stream = %log, group = %group, "Created consumer group"),
        Ok(false) => {}
        Err(e) => {
            tracing::warn!(stream = %log, group = %group, error = %e, "Failed to create consumer group")
        }
    }
}
