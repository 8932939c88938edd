//! Safe trimming of logs
//!
//! A log is trimmed at the most conservative of three lower bounds:
//!
//! - **age**: entries older than `max_age`
//! - **ack**: the earliest entry still pending in the stream's group
//! - **priority**: for High/Critical streams, entries younger than
//!   `min_retention_time` are protected
//!
//! Criteria that impose no restriction are ignored. When none imposes one,
//! the log is trimmed by length instead, keeping the newest
//! `max(max_length, min_retention_count)` entries.

use crate::task::ShutdownSignal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_core::{
    error::{Result, SluiceError},
    observe, EntryId, LogStore, StreamConfig, TrimBound,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The three candidate bounds computed for one cleanup run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimCandidates {
    pub age: TrimBound,
    pub ack: TrimBound,
    pub priority: TrimBound,
}

impl TrimCandidates {
    /// Earliest of the bounded candidates, or `Unbounded` if there are none
    pub fn safe_bound(&self) -> TrimBound {
        TrimBound::min_of([self.age, self.ack, self.priority])
    }
}

/// How a cleanup run trimmed the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrimBoundary {
    /// Entries below this id were deleted
    ById(EntryId),

    /// The oldest entries were deleted down to this many
    ByLength(u64),

    /// Nothing to do (empty or absent log, or already short enough)
    Skipped,
}

/// Outcome of one cleanup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub log: String,
    pub deleted: u64,
    pub boundary: TrimBoundary,
    pub remaining: u64,
}

impl CleanupReport {
    fn skipped(log: &str, remaining: u64) -> Self {
        Self {
            log: log.to_string(),
            deleted: 0,
            boundary: TrimBoundary::Skipped,
            remaining,
        }
    }
}

/// Computes safe trim boundaries and trims logs
#[derive(Clone)]
pub struct CleanupManager {
    store: Arc<dyn LogStore>,
}

impl CleanupManager {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    /// Compute the candidate bounds for a stream as of `now`
    ///
    /// A missing group or an empty pending set imposes no ack bound. Any other
    /// failure reading the pending set is returned, so the caller never trims
    /// without knowing what is still unacknowledged.
    pub async fn candidates(
        &self,
        config: &StreamConfig,
        now: DateTime<Utc>,
    ) -> Result<TrimCandidates> {
        let age = if config.max_age.is_zero() {
            TrimBound::Unbounded
        } else {
            TrimBound::At(cutoff_id(now, config.max_age))
        };

        let ack = match self
            .store
            .pending_summary(&config.name, &config.group)
            .await
        {
            Ok(summary) => match summary.lower {
                Some(lower) if summary.count > 0 => TrimBound::At(lower),
                _ => TrimBound::Unbounded,
            },
            Err(SluiceError::GroupNotFound { .. }) => TrimBound::Unbounded,
            Err(e) => return Err(e),
        };

        let priority =
            if config.priority.protects_recent() && !config.min_retention_time.is_zero() {
                TrimBound::At(cutoff_id(now, config.min_retention_time))
            } else {
                TrimBound::Unbounded
            };

        Ok(TrimCandidates { age, ack, priority })
    }

    /// The id below which entries may be trimmed as of `now`
    pub async fn safe_bound(&self, config: &StreamConfig, now: DateTime<Utc>) -> Result<TrimBound> {
        Ok(self.candidates(config, now).await?.safe_bound())
    }

    /// Trim one log according to its config
    ///
    /// An absent or empty log is a no-op.
    pub async fn cleanup_stream(&self, config: &StreamConfig) -> Result<CleanupReport> {
        let started = Instant::now();
        let log = config.name.as_str();

        let len = self.store.len(log).await?;
        if len == 0 {
            return Ok(CleanupReport::skipped(log, 0));
        }

        let (deleted, boundary) = match self.safe_bound(config, Utc::now()).await? {
            TrimBound::At(id) => (self.store.trim_min_id(log, id).await?, TrimBoundary::ById(id)),
            TrimBound::Unbounded => {
                let keep = config.max_length.max(config.min_retention_count);
                if len <= keep {
                    return Ok(CleanupReport::skipped(log, len));
                }
                (
                    self.store.trim_max_len(log, keep).await?,
                    TrimBoundary::ByLength(keep),
                )
            }
        };

        let remaining = self.store.len(log).await?;
        observe::record_cleanup(started.elapsed(), deleted);

        if deleted > 0 {
            tracing::info!(
                stream = %log,
                deleted,
                remaining,
                boundary = ?boundary,
                "Trimmed stream"
            );
        }
        if config.min_retention_count > 0 && remaining < config.min_retention_count {
            tracing::info!(
                stream = %log,
                remaining,
                min_retention_count = config.min_retention_count,
                "Stream is below its minimum retention count"
            );
        }

        Ok(CleanupReport {
            log: log.to_string(),
            deleted,
            boundary,
            remaining,
        })
    }

    /// Run `cleanup_stream` every `config.cleanup_interval` until shutdown
    ///
    /// The first run happens one interval after start. Failed runs are
    /// logged and retried on the next tick.
    pub async fn run_periodic(&self, config: StreamConfig, mut shutdown: ShutdownSignal) {
        let interval = config.cleanup_interval.max(Duration::from_millis(1));
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_stream(&config).await {
                        tracing::error!(stream = %config.name, error = %e, "Cleanup failed");
                    }
                }
            }
        }

        tracing::debug!(stream = %config.name, "Cleanup loop stopped");
    }
}

/// Smallest id at `now - age`
fn cutoff_id(now: DateTime<Utc>, age: Duration) -> EntryId {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .map(EntryId::from_time)
        .unwrap_or(EntryId::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{fields, Priority};
    use sluice_memory::{MemoryLogStore, StoreOp};

    const MINUTE: u64 = 60_000;

    fn now_ms() -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    /// Seed one entry per age (in minutes), oldest first
    fn seed(store: &MemoryLogStore, log: &str, ages_min: &[u64]) -> Vec<EntryId> {
        let now = now_ms();
        ages_min
            .iter()
            .map(|age| {
                let id = EntryId::at_millis(now - age * MINUTE);
                store
                    .append_with_id(log, id, fields! { "age" => *age })
                    .unwrap()
            })
            .collect()
    }

    fn manager() -> (Arc<MemoryLogStore>, CleanupManager) {
        let store = Arc::new(MemoryLogStore::new());
        (store.clone(), CleanupManager::new(store))
    }

    #[tokio::test]
    async fn test_absent_log_is_noop() {
        let (_store, mgr) = manager();
        let report = mgr
            .cleanup_stream(&StreamConfig::new("missing"))
            .await
            .unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(report.boundary, TrimBoundary::Skipped);
    }

    #[tokio::test]
    async fn test_age_bound_trims_old_entries() {
        let (store, mgr) = manager();
        seed(&store, "log", &[180, 120, 61, 59, 30, 1]);

        let config = StreamConfig::new("log").with_max_age(Duration::from_secs(3600));
        let report = mgr.cleanup_stream(&config).await.unwrap();

        assert_eq!(report.deleted, 3);
        assert_eq!(report.remaining, 3);
        assert!(matches!(report.boundary, TrimBoundary::ById(_)));
    }

    #[tokio::test]
    async fn test_ack_bound_protects_pending() {
        let (store, mgr) = manager();
        store
            .create_group("log", "log_group", EntryId::MIN)
            .await
            .unwrap();
        let ids = seed(&store, "log", &[300, 240, 180, 120]);

        // Deliver everything, ack only the oldest
        let delivered = store
            .read_group("log", "log_group", "c", 10, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(delivered.len(), 4);
        store.ack("log", "log_group", &[ids[0]]).await.unwrap();

        let config = StreamConfig::new("log").with_max_age(Duration::from_secs(60));
        let candidates = mgr.candidates(&config, Utc::now()).await.unwrap();
        assert_eq!(candidates.ack, TrimBound::At(ids[1]));
        assert_eq!(candidates.safe_bound(), TrimBound::At(ids[1]));

        let report = mgr.cleanup_stream(&config).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(store.entries("log")[0].id, ids[1]);
    }

    #[tokio::test]
    async fn test_priority_bound_protects_recent_entries() {
        let (_store, mgr) = manager();
        let now = Utc::now();

        let normal = StreamConfig::new("log")
            .with_max_age(Duration::ZERO)
            .with_min_retention_time(Duration::from_secs(600));
        let candidates = mgr.candidates(&normal, now).await.unwrap();
        assert_eq!(candidates.priority, TrimBound::Unbounded);
        assert_eq!(candidates.age, TrimBound::Unbounded);

        let high = normal.clone().with_priority(Priority::High);
        let candidates = mgr.candidates(&high, now).await.unwrap();
        let expected = EntryId::from_time(now - chrono::Duration::seconds(600));
        assert_eq!(candidates.priority, TrimBound::At(expected));
    }

    #[tokio::test]
    async fn test_minimum_of_candidates_wins() {
        let (_store, mgr) = manager();
        let now = Utc::now();

        // Age says 1h, priority protects the last 2h: the 2h cutoff is earlier
        let config = StreamConfig::new("log")
            .with_priority(Priority::Critical)
            .with_max_age(Duration::from_secs(3600))
            .with_min_retention_time(Duration::from_secs(7200));
        let bound = mgr.safe_bound(&config, now).await.unwrap();

        assert_eq!(
            bound,
            TrimBound::At(EntryId::from_time(now - chrono::Duration::hours(2)))
        );
    }

    #[tokio::test]
    async fn test_length_fallback_keeps_max_of_length_and_retention_count() {
        let (store, mgr) = manager();
        for i in 0..30i64 {
            store.append("log", &fields! { "i" => i }).await.unwrap();
        }

        let config = StreamConfig::new("log")
            .with_max_age(Duration::ZERO)
            .with_max_length(5)
            .with_min_retention_count(20);
        let report = mgr.cleanup_stream(&config).await.unwrap();

        assert_eq!(report.boundary, TrimBoundary::ByLength(20));
        assert_eq!(report.deleted, 10);
        assert_eq!(report.remaining, 20);

        // Already short enough: nothing happens
        let report = mgr.cleanup_stream(&config).await.unwrap();
        assert_eq!(report.boundary, TrimBoundary::Skipped);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_pending_read_failure_aborts_cleanup() {
        let (store, mgr) = manager();
        seed(&store, "log", &[300, 1]);
        store.fail_op(StoreOp::PendingSummary);

        let config = StreamConfig::new("log").with_max_age(Duration::from_secs(60));
        assert!(mgr.cleanup_stream(&config).await.is_err());
        assert_eq!(store.op_count(StoreOp::TrimMinId), 0);
        assert_eq!(store.len("log").await.unwrap(), 2);
    }

    #[test]
    fn test_cutoff_clamps_huge_ages() {
        let id = cutoff_id(Utc::now(), Duration::from_secs(u64::MAX / 4));
        assert_eq!(id, EntryId::MIN);
    }
}
