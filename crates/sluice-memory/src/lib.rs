//! In-process log store for sluice
//!
//! Provides a [`LogStore`](sluice_core::LogStore) implementation held
//! entirely in memory. It is used as an embedded backend for single-process
//! deployments and as the store behind the sluice test suites.
//!
//! Features:
//! - Ordered entries with `<ms>-<seq>` ids that never go backwards
//! - Consumer groups with delivery cursors and pending sets
//! - Blocking group reads woken by appends
//! - TTL keys with atomic compare-and-delete
//! - Per-operation call counters and fault injection

mod store;

pub use store::{MemoryLogStore, StoreOp};
