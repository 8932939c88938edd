use crate::error::Result;
use crate::types::{Entry, EntryId, Fields, PendingSummary};
use async_trait::async_trait;
use std::time::Duration;

/// Shared append-only log store with consumer groups
///
/// One handle is shared by every producer, consumer and background task in
/// the process, so implementations must be safe for concurrent use.
///
/// Unreachable stores report [`SluiceError::StoreUnavailable`]; reads of a
/// group that does not exist report [`SluiceError::GroupNotFound`]. Absent
/// logs are not an error: they have length zero and trims delete nothing.
///
/// [`SluiceError::StoreUnavailable`]: crate::error::SluiceError::StoreUnavailable
/// [`SluiceError::GroupNotFound`]: crate::error::SluiceError::GroupNotFound
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append an entry, creating the log if needed
    ///
    /// Returns the id assigned by the store. Ids strictly increase within a
    /// log.
    async fn append(&self, log: &str, fields: &Fields) -> Result<EntryId>;

    /// Read entries never delivered to the group before
    ///
    /// Delivered entries join the group's pending set under `consumer` until
    /// acknowledged. When nothing is available the call waits up to `block`
    /// for new entries; a zero `block` returns immediately.
    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>>;

    /// Remove entries from the group's pending set
    ///
    /// Returns how many were actually pending.
    async fn ack(&self, log: &str, group: &str, ids: &[EntryId]) -> Result<u64>;

    /// Count and id range of the group's pending set
    async fn pending_summary(&self, log: &str, group: &str) -> Result<PendingSummary>;

    /// Delete every entry with an id below `min_id`
    async fn trim_min_id(&self, log: &str, min_id: EntryId) -> Result<u64>;

    /// Delete the oldest entries until at most `max_len` remain
    async fn trim_max_len(&self, log: &str, max_len: u64) -> Result<u64>;

    /// Number of entries in the log (zero if absent)
    async fn len(&self, log: &str) -> Result<u64>;

    /// Read up to `count` entries starting at `start` (inclusive), outside any
    /// consumer group
    async fn read_from(&self, log: &str, start: EntryId, count: usize) -> Result<Vec<Entry>>;

    /// Append `entries` to `to` and delete them from `from` as one unit
    ///
    /// Either every entry moves or nothing does. Returns the number moved.
    async fn transfer(&self, from: &str, to: &str, entries: &[Entry]) -> Result<u64>;

    /// Create the group if it does not exist, creating the log as well
    ///
    /// The group starts delivering after `start` (use [`EntryId::MIN`] for the
    /// whole log). Returns false if the group already existed.
    async fn create_group(&self, log: &str, group: &str, start: EntryId) -> Result<bool>;

    /// Set `key` to `token` with a TTL unless the key already holds a value
    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it still holds `token`, atomically
    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool>;

    /// Round trip to check the store is reachable
    async fn ping(&self) -> Result<()>;
}
