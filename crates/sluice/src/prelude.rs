//! Convenience re-exports for common types.

pub use crate::cleanup::{CleanupManager, CleanupReport};
pub use crate::consumer::{handler_fn, Consumer, MessageHandler, StreamConsumer};
pub use crate::context::StreamContext;
pub use crate::manager::StreamManager;
pub use crate::producer::{BackupProducer, Producer, SimpleProducer};
pub use sluice_core::fields;
pub use sluice_core::{
    Appended, BackupStreamConfig, ConsumerConfig, Entry, EntryId, FieldValue, Fields, LogStore,
    Priority, Result, SluiceError, StreamConfig,
};
