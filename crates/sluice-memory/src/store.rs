use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use sluice_core::{
    error::{Result, SluiceError},
    traits::LogStore,
    types::{Entry, EntryId, Fields, PendingSummary},
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Store operations, used for call counting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Append,
    ReadGroup,
    Ack,
    PendingSummary,
    TrimMinId,
    TrimMaxLen,
    Len,
    ReadFrom,
    Transfer,
    CreateGroup,
    SetIfAbsent,
    DeleteIfEquals,
    Ping,
}

/// A delivered, unacknowledged entry
#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Highest id ever delivered to this group
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct LogState {
    entries: BTreeMap<EntryId, Fields>,
    /// Highest id ever assigned; survives trimming
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl LogState {
    fn next_id(&self) -> EntryId {
        let now_ms = Utc::now().timestamp_millis().max(0) as u64;
        if now_ms > self.last_id.ms {
            EntryId::at_millis(now_ms)
        } else {
            self.last_id.next()
        }
    }

    fn push(&mut self, id: EntryId, fields: Fields) {
        self.entries.insert(id, fields);
        self.last_id = id;
    }
}

#[derive(Debug)]
struct KeyRecord {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct StoreState {
    logs: HashMap<String, LogState>,
    keys: HashMap<String, KeyRecord>,
}

impl StoreState {
    fn group_mut(&mut self, log: &str, group: &str) -> Result<&mut GroupState> {
        self.logs
            .get_mut(log)
            .and_then(|l| l.groups.get_mut(group))
            .ok_or_else(|| SluiceError::GroupNotFound {
                log: log.to_string(),
                group: group.to_string(),
            })
    }

    fn live_key(&mut self, key: &str, now: Instant) -> Option<&KeyRecord> {
        if self.keys.get(key).is_some_and(|r| r.expires_at <= now) {
            self.keys.remove(key);
        }
        self.keys.get(key)
    }
}

/// In-process log store
///
/// Implements the full [`LogStore`] contract: per-log ordered entries,
/// consumer groups with pending sets, min-id and max-length trimming, and
/// TTL keys with compare-and-delete. Every operation runs under one mutex,
/// which also makes [`LogStore::transfer`] all-or-nothing.
///
/// Besides serving as an embedded backend, the store is instrumented for
/// tests: every call is counted per [`StoreOp`], the whole store can be
/// taken offline, and individual operations can be made to fail.
pub struct MemoryLogStore {
    state: Mutex<StoreState>,
    appended: Notify,
    available: AtomicBool,
    failing: DashSet<StoreOp>,
    calls: DashMap<StoreOp, u64>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            appended: Notify::new(),
            available: AtomicBool::new(true),
            failing: DashSet::new(),
            calls: DashMap::new(),
        }
    }

    /// Take the whole store offline (or bring it back)
    ///
    /// While offline every operation fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        if self.available.swap(available, Ordering::SeqCst) != available {
            tracing::debug!(available, "Memory store availability changed");
        }
        // Wake blocked readers so they observe the change
        self.appended.notify_waiters();
    }

    /// Make one operation fail with `StoreUnavailable` until cleared
    pub fn fail_op(&self, op: StoreOp) {
        tracing::debug!(op = ?op, "Injecting store failure");
        self.failing.insert(op);
    }

    pub fn clear_failure(&self, op: StoreOp) {
        self.failing.remove(&op);
    }

    /// Number of calls made to an operation, including failed ones
    pub fn op_count(&self, op: StoreOp) -> u64 {
        self.calls.get(&op).map(|c| *c).unwrap_or(0)
    }

    pub fn reset_counts(&self) {
        self.calls.clear();
    }

    /// Append with a caller-chosen id
    ///
    /// The id must be greater than every id previously assigned in the log.
    pub fn append_with_id(&self, log: &str, id: EntryId, fields: Fields) -> Result<EntryId> {
        self.check(StoreOp::Append)?;
        let mut state = self.state.lock();
        let log_state = state.logs.entry(log.to_string()).or_default();
        if id <= log_state.last_id {
            return Err(SluiceError::InvalidEntryId(format!(
                "{} is not greater than the top item {} of {}",
                id, log_state.last_id, log
            )));
        }
        log_state.push(id, fields);
        drop(state);

        self.appended.notify_waiters();
        Ok(id)
    }

    /// Snapshot of every entry in a log, oldest first
    pub fn entries(&self, log: &str) -> Vec<Entry> {
        let state = self.state.lock();
        state
            .logs
            .get(log)
            .map(|l| {
                l.entries
                    .iter()
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids currently pending in a group, oldest first
    pub fn pending_ids(&self, log: &str, group: &str) -> Vec<EntryId> {
        let state = self.state.lock();
        state
            .logs
            .get(log)
            .and_then(|l| l.groups.get(group))
            .map(|g| g.pending.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Consumer that owns a pending entry, with its delivery count
    pub fn pending_owner(&self, log: &str, group: &str, id: EntryId) -> Option<(String, u32)> {
        let state = self.state.lock();
        state
            .logs
            .get(log)
            .and_then(|l| l.groups.get(group))
            .and_then(|g| g.pending.get(&id))
            .map(|p| (p.consumer.clone(), p.deliveries))
    }

    /// Current value of a TTL key, if set and not expired
    pub fn key_value(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.live_key(key, Instant::now()).map(|r| r.value.clone())
    }

    /// Names of every log that exists
    pub fn logs(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.logs.keys().cloned().collect();
        names.sort();
        names
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        if !self.available.load(Ordering::SeqCst) {
            return Err(SluiceError::StoreUnavailable("store offline".into()));
        }
        if self.failing.contains(&op) {
            return Err(SluiceError::StoreUnavailable(format!(
                "injected failure on {:?}",
                op
            )));
        }
        Ok(())
    }

    fn append_sync(&self, log: &str, fields: &Fields) -> EntryId {
        let mut state = self.state.lock();
        let log_state = state.logs.entry(log.to_string()).or_default();
        let id = log_state.next_id();
        log_state.push(id, fields.clone());
        id
    }

    fn deliver(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Entry>> {
        let mut state = self.state.lock();
        let log_state = state
            .logs
            .get_mut(log)
            .ok_or_else(|| SluiceError::GroupNotFound {
                log: log.to_string(),
                group: group.to_string(),
            })?;
        let LogState {
            entries, groups, ..
        } = log_state;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| SluiceError::GroupNotFound {
                log: log.to_string(),
                group: group.to_string(),
            })?;

        let limit = if count == 0 { usize::MAX } else { count };
        let delivered: Vec<Entry> = entries
            .range((Bound::Excluded(group_state.last_delivered), Bound::Unbounded))
            .take(limit)
            .map(|(id, fields)| Entry::new(*id, fields.clone()))
            .collect();

        for entry in &delivered {
            let pending = group_state
                .pending
                .entry(entry.id)
                .or_insert_with(|| PendingEntry {
                    consumer: consumer.to_string(),
                    deliveries: 0,
                });
            pending.consumer = consumer.to_string();
            pending.deliveries += 1;
        }
        if let Some(last) = delivered.last() {
            group_state.last_delivered = last.id;
        }

        Ok(delivered)
    }

    fn ack_sync(&self, log: &str, group: &str, ids: &[EntryId]) -> u64 {
        let mut state = self.state.lock();
        match state.group_mut(log, group) {
            Ok(group_state) => ids
                .iter()
                .filter(|id| group_state.pending.remove(id).is_some())
                .count() as u64,
            Err(_) => 0,
        }
    }

    fn pending_sync(&self, log: &str, group: &str) -> Result<PendingSummary> {
        let mut state = self.state.lock();
        let group_state = state.group_mut(log, group)?;
        Ok(PendingSummary {
            count: group_state.pending.len() as u64,
            lower: group_state.pending.keys().next().copied(),
            upper: group_state.pending.keys().next_back().copied(),
        })
    }

    fn trim_min_id_sync(&self, log: &str, min_id: EntryId) -> u64 {
        let mut state = self.state.lock();
        let Some(log_state) = state.logs.get_mut(log) else {
            return 0;
        };
        let kept = log_state.entries.split_off(&min_id);
        let deleted = log_state.entries.len() as u64;
        log_state.entries = kept;
        deleted
    }

    fn trim_max_len_sync(&self, log: &str, max_len: u64) -> u64 {
        let mut state = self.state.lock();
        let Some(log_state) = state.logs.get_mut(log) else {
            return 0;
        };
        let mut deleted = 0;
        while log_state.entries.len() as u64 > max_len {
            log_state.entries.pop_first();
            deleted += 1;
        }
        deleted
    }

    fn len_sync(&self, log: &str) -> u64 {
        let state = self.state.lock();
        state
            .logs
            .get(log)
            .map(|l| l.entries.len() as u64)
            .unwrap_or(0)
    }

    fn read_from_sync(&self, log: &str, start: EntryId, count: usize) -> Vec<Entry> {
        let state = self.state.lock();
        state
            .logs
            .get(log)
            .map(|l| {
                l.entries
                    .range(start..)
                    .take(count)
                    .map(|(id, fields)| Entry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn transfer_sync(&self, from: &str, to: &str, entries: &[Entry]) -> u64 {
        let mut state = self.state.lock();

        let target = state.logs.entry(to.to_string()).or_default();
        for entry in entries {
            let id = target.next_id();
            target.push(id, entry.fields.clone());
        }

        if let Some(source) = state.logs.get_mut(from) {
            for entry in entries {
                source.entries.remove(&entry.id);
            }
        }

        entries.len() as u64
    }

    fn create_group_sync(&self, log: &str, group: &str, start: EntryId) -> bool {
        let mut state = self.state.lock();
        let log_state = state.logs.entry(log.to_string()).or_default();
        if log_state.groups.contains_key(group) {
            return false;
        }
        log_state.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered: start,
                pending: BTreeMap::new(),
            },
        );
        true
    }

    fn set_if_absent_sync(&self, key: &str, token: &str, ttl: Duration) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        if state.live_key(key, now).is_some() {
            return false;
        }
        state.keys.insert(
            key.to_string(),
            KeyRecord {
                value: token.to_string(),
                expires_at: now + ttl,
            },
        );
        true
    }

    fn delete_if_equals_sync(&self, key: &str, token: &str) -> bool {
        let mut state = self.state.lock();
        let matches = state
            .live_key(key, Instant::now())
            .is_some_and(|r| r.value == token);
        if matches {
            state.keys.remove(key);
        }
        matches
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, log: &str, fields: &Fields) -> Result<EntryId> {
        self.check(StoreOp::Append)?;
        let id = self.append_sync(log, fields);
        self.appended.notify_waiters();
        Ok(id)
    }

    async fn read_group(
        &self,
        log: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Entry>> {
        self.check(StoreOp::ReadGroup)?;
        let deadline = tokio::time::Instant::now() + block;

        loop {
            // Register interest before looking, so an append between the
            // check and the wait is not missed.
            let notified = self.appended.notified();

            let delivered = self.deliver(log, group, consumer, count)?;
            if !delivered.is_empty() {
                return Ok(delivered);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Ok(Vec::new());
            }
            if !self.available.load(Ordering::SeqCst) {
                return Err(SluiceError::StoreUnavailable("store offline".into()));
            }
        }
    }

    async fn ack(&self, log: &str, group: &str, ids: &[EntryId]) -> Result<u64> {
        self.check(StoreOp::Ack)?;
        Ok(self.ack_sync(log, group, ids))
    }

    async fn pending_summary(&self, log: &str, group: &str) -> Result<PendingSummary> {
        self.check(StoreOp::PendingSummary)?;
        self.pending_sync(log, group)
    }

    async fn trim_min_id(&self, log: &str, min_id: EntryId) -> Result<u64> {
        self.check(StoreOp::TrimMinId)?;
        Ok(self.trim_min_id_sync(log, min_id))
    }

    async fn trim_max_len(&self, log: &str, max_len: u64) -> Result<u64> {
        self.check(StoreOp::TrimMaxLen)?;
        Ok(self.trim_max_len_sync(log, max_len))
    }

    async fn len(&self, log: &str) -> Result<u64> {
        self.check(StoreOp::Len)?;
        Ok(self.len_sync(log))
    }

    async fn read_from(&self, log: &str, start: EntryId, count: usize) -> Result<Vec<Entry>> {
        self.check(StoreOp::ReadFrom)?;
        Ok(self.read_from_sync(log, start, count))
    }

    async fn transfer(&self, from: &str, to: &str, entries: &[Entry]) -> Result<u64> {
        self.check(StoreOp::Transfer)?;
        if entries.is_empty() {
            return Ok(0);
        }
        let moved = self.transfer_sync(from, to, entries);
        self.appended.notify_waiters();
        Ok(moved)
    }

    async fn create_group(&self, log: &str, group: &str, start: EntryId) -> Result<bool> {
        self.check(StoreOp::CreateGroup)?;
        Ok(self.create_group_sync(log, group, start))
    }

    async fn set_if_absent(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        self.check(StoreOp::SetIfAbsent)?;
        Ok(self.set_if_absent_sync(key, token, ttl))
    }

    async fn delete_if_equals(&self, key: &str, token: &str) -> Result<bool> {
        self.check(StoreOp::DeleteIfEquals)?;
        Ok(self.delete_if_equals_sync(key, token))
    }

    async fn ping(&self) -> Result<()> {
        self.check(StoreOp::Ping)
    }
}
