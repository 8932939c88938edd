//! Sluice Core: types and traits shared by the sluice crates
//!
//! This crate defines:
//! - Entry ids, field maps and pending-set summaries
//! - Stream, backup-stream and consumer configuration with defaults
//! - The [`LogStore`] trait: an append-only log store with consumer groups,
//!   trimming and TTL keys
//! - The error taxonomy shared by producers, consumers and the registry
//! - Optional metrics hooks (`observe` feature)

pub mod config;
pub mod error;
pub mod observe;
pub mod traits;
pub mod types;

pub use config::{BackupCheckConfig, BackupStreamConfig, ConsumerConfig, Priority, StreamConfig};
pub use error::{Result, SluiceError};
pub use traits::LogStore;
pub use types::{Appended, Entry, EntryId, FieldValue, Fields, PendingSummary, TrimBound};
