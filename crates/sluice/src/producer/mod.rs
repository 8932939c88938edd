//! Producers: the write side of a stream
//!
//! [`SimpleProducer`] appends straight to its log. [`BackupProducer`] routes
//! to a secondary log when the primary is saturated and drains that backlog
//! back as capacity frees up. Both run a periodic cleanup of their log.

mod backup;
mod simple;

pub use backup::{BackupCache, BackupProducer, Route, RouteDecision, RouteReason};
pub use simple::SimpleProducer;

use async_trait::async_trait;
use sluice_core::{error::Result, Appended, Fields};

/// Capability shared by every producer variant
#[async_trait]
pub trait Producer: Send + Sync {
    /// Append one message
    ///
    /// Failures are always reported to the caller; nothing is dropped
    /// silently.
    async fn add_message(&self, fields: Fields) -> Result<Appended>;

    /// Name of the producer's primary log
    fn log_name(&self) -> &str;

    /// Stop background tasks and wait for them to exit
    ///
    /// Idempotent.
    async fn stop(&self);

    /// True while background tasks are running and none has crashed
    fn is_running(&self) -> bool;
}
