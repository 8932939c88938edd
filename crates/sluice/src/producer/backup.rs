use super::Producer;
use crate::cleanup::CleanupManager;
use crate::lock::{DistributedLock, LockLease, ROUTE_LOCK_TTL};
use crate::task::{AdaptiveInterval, ShutdownSignal, TaskSupervisor};
use async_trait::async_trait;
use parking_lot::RwLock;
use sluice_core::{
    error::{Result, SluiceError},
    observe, Appended, BackupCheckConfig, BackupStreamConfig, EntryId, Fields, LogStore,
};
use std::sync::Arc;
use std::time::Instant;

/// Which log a message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    Backup,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Primary => "primary",
            Route::Backup => "backup",
        }
    }
}

/// Why a routing decision was made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    /// A recent length check found the backup non-empty
    CachedBackupActive,
    /// The backup log is non-empty, so ordering behind it is preserved
    BackupNonEmpty,
    /// Another instance holds the stream lock
    LockBusy,
    /// The lock could not be attempted; the message goes to the primary
    LockError,
    /// The primary group's pending set reached max length
    PrimarySaturated,
    /// The pending count could not be read under the lock
    PendingUnknown,
    /// The primary has spare capacity
    PrimaryAvailable,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteReason::CachedBackupActive => "cached_backup_active",
            RouteReason::BackupNonEmpty => "backup_non_empty",
            RouteReason::LockBusy => "lock_busy",
            RouteReason::LockError => "lock_error",
            RouteReason::PrimarySaturated => "primary_saturated",
            RouteReason::PendingUnknown => "pending_unknown",
            RouteReason::PrimaryAvailable => "primary_available",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision {
    pub route: Route,
    pub reason: RouteReason,
}

impl RouteDecision {
    fn new(route: Route, reason: RouteReason) -> Self {
        Self { route, reason }
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    checked_at: Instant,
    active: bool,
}

/// Local memory of the last backup-length check
///
/// An "active" observation is trusted for the slow timeout, an "empty" one
/// for the fast timeout. Only a trusted active observation lets routing skip
/// the store.
pub struct BackupCache {
    check: BackupCheckConfig,
    last: RwLock<Option<Observation>>,
}

impl BackupCache {
    pub fn new(check: BackupCheckConfig) -> Self {
        Self {
            check,
            last: RwLock::new(None),
        }
    }

    /// True if a still-fresh check found the backup non-empty
    pub fn is_active(&self) -> bool {
        match *self.last.read() {
            Some(obs) => {
                let ttl = if obs.active {
                    self.check.slow_timeout
                } else {
                    self.check.fast_timeout
                };
                obs.active && obs.checked_at.elapsed() < ttl
            }
            None => false,
        }
    }

    /// Result of the most recent check, however old
    pub fn last_observed(&self) -> Option<bool> {
        (*self.last.read()).map(|obs| obs.active)
    }

    pub fn update(&self, active: bool) {
        *self.last.write() = Some(Observation {
            checked_at: Instant::now(),
            active,
        });
    }
}

struct Shared {
    store: Arc<dyn LogStore>,
    config: BackupStreamConfig,
    lock: DistributedLock,
    cache: BackupCache,
}

/// Producer with failover to a backup log
///
/// Messages go to the primary log unless its group's pending set has reached
/// `max_length`, in which case they go to the backup log. Once the backup
/// holds anything, new messages follow it there until a background transfer
/// has drained it back into the primary.
pub struct BackupProducer {
    shared: Arc<Shared>,
    tasks: TaskSupervisor,
}

impl BackupProducer {
    /// Create the producer and start its transfer and cleanup loops
    pub async fn start(store: Arc<dyn LogStore>, config: BackupStreamConfig) -> Self {
        let config = config.normalized();
        crate::ensure_group(store.as_ref(), &config.stream.name, &config.stream.group).await;

        let shared = Arc::new(Shared {
            lock: DistributedLock::for_stream(store.clone(), &config.stream.name),
            cache: BackupCache::new(config.backup_check),
            store,
            config,
        });

        let tasks = TaskSupervisor::new(format!("producer:{}", shared.config.name()));
        {
            let shared = shared.clone();
            tasks.spawn("backup_transfer", move |shutdown| async move {
                shared.run_transfer(shutdown).await
            });
        }
        {
            let cleanup = CleanupManager::new(shared.store.clone());
            let cleanup_config = shared.config.stream.clone();
            tasks.spawn("producer_cleanup", move |shutdown| async move {
                cleanup.run_periodic(cleanup_config, shutdown).await
            });
        }

        tracing::info!(
            stream = %shared.config.name(),
            backup = %shared.config.backup_log,
            "Started backup producer"
        );

        Self { shared, tasks }
    }

    pub fn config(&self) -> &BackupStreamConfig {
        &self.shared.config
    }

    pub fn backup_log(&self) -> &str {
        &self.shared.config.backup_log
    }

    pub fn cache(&self) -> &BackupCache {
        &self.shared.cache
    }

    /// Decide where the next message should go
    pub async fn route(&self) -> RouteDecision {
        self.shared.route().await
    }

    /// Run one backup-to-primary transfer cycle
    ///
    /// Returns the number of entries moved.
    pub async fn transfer_once(&self) -> Result<u64> {
        self.shared.transfer_once().await
    }
}

impl Shared {
    async fn route(&self) -> RouteDecision {
        if self.cache.is_active() {
            return RouteDecision::new(Route::Backup, RouteReason::CachedBackupActive);
        }

        match self.store.len(&self.config.backup_log).await {
            Ok(len) => {
                self.cache.update(len > 0);
                if len > 0 {
                    return RouteDecision::new(Route::Backup, RouteReason::BackupNonEmpty);
                }
            }
            Err(e) => {
                tracing::warn!(backup = %self.config.backup_log, error = %e, "Failed to check backup length");
                self.cache.update(false);
            }
        }

        let lease = match self.lock.try_acquire(ROUTE_LOCK_TTL).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::debug!(stream = %self.config.name(), "Stream lock busy, routing to backup");
                return RouteDecision::new(Route::Backup, RouteReason::LockBusy);
            }
            Err(e) => {
                tracing::warn!(stream = %self.config.name(), error = %e, "Failed to take stream lock, routing to primary");
                return RouteDecision::new(Route::Primary, RouteReason::LockError);
            }
        };

        let decision = match self
            .store
            .pending_summary(&self.config.stream.name, &self.config.stream.group)
            .await
        {
            Ok(pending) if pending.count >= self.config.stream.max_length => {
                tracing::warn!(
                    stream = %self.config.name(),
                    pending = pending.count,
                    max_length = self.config.stream.max_length,
                    "Primary saturated, routing to backup"
                );
                RouteDecision::new(Route::Backup, RouteReason::PrimarySaturated)
            }
            Ok(_) => RouteDecision::new(Route::Primary, RouteReason::PrimaryAvailable),
            Err(e) => {
                tracing::warn!(stream = %self.config.name(), error = %e, "Failed to read pending count, routing to primary");
                RouteDecision::new(Route::Primary, RouteReason::PendingUnknown)
            }
        };

        self.release(&lease).await;
        decision
    }

    async fn add_message(&self, fields: &Fields) -> Result<Appended> {
        let decision = self.route().await;
        observe::record_route(decision.route.as_str(), decision.reason.as_str());

        let log = match decision.route {
            Route::Primary => &self.config.stream.name,
            Route::Backup => &self.config.backup_log,
        };

        let id = self.store.append(log, fields).await.inspect_err(|e| {
            tracing::error!(stream = %log, error = %e, "Failed to append message")
        })?;

        Ok(Appended {
            log: log.clone(),
            id,
        })
    }

    async fn transfer_once(&self) -> Result<u64> {
        let Some(lease) = self.lock.try_acquire(self.config.lock_timeout).await? else {
            return Ok(0);
        };

        let result = self.transfer_locked().await;
        self.release(&lease).await;

        let moved = result?;
        observe::record_transfer(moved);
        if moved > 0 {
            tracing::debug!(
                stream = %self.config.name(),
                moved,
                "Transferred entries from backup"
            );
        }
        Ok(moved)
    }

    async fn transfer_locked(&self) -> Result<u64> {
        let stream = &self.config.stream;

        let pending = match self.store.pending_summary(&stream.name, &stream.group).await {
            Ok(summary) => summary.count,
            Err(SluiceError::GroupNotFound { .. }) => 0,
            Err(e) => return Err(e),
        };

        let capacity = stream.max_length.saturating_sub(pending);
        if capacity == 0 {
            return Ok(0);
        }

        let count = self.config.transfer_batch_size.min(capacity) as usize;
        let entries = self
            .store
            .read_from(&self.config.backup_log, EntryId::MIN, count)
            .await?;
        if entries.is_empty() {
            self.cache.update(false);
            return Ok(0);
        }

        self.store
            .transfer(&self.config.backup_log, &stream.name, &entries)
            .await
            .map_err(|e| SluiceError::PartialTransfer {
                from: self.config.backup_log.clone(),
                to: stream.name.clone(),
                reason: e.to_string(),
            })
    }

    async fn release(&self, lease: &LockLease) {
        if let Err(e) = self.lock.release(lease).await {
            tracing::warn!(key = %lease.key(), error = %e, "Failed to release stream lock");
        }
    }

    async fn run_transfer(&self, mut shutdown: ShutdownSignal) {
        let mut interval = AdaptiveInterval::new(
            self.config.transfer_interval_active,
            self.config.transfer_interval_idle,
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval.current()) => {
                    let moved = match self.transfer_once().await {
                        Ok(moved) => moved,
                        Err(e) => {
                            tracing::error!(stream = %self.config.name(), error = %e, "Backup transfer failed");
                            0
                        }
                    };
                    interval.record(moved);
                }
            }
        }

        tracing::debug!(stream = %self.config.name(), "Transfer loop stopped");
    }
}

#[async_trait]
impl Producer for BackupProducer {
    async fn add_message(&self, fields: Fields) -> Result<Appended> {
        self.shared.add_message(&fields).await
    }

    fn log_name(&self) -> &str {
        &self.shared.config.stream.name
    }

    async fn stop(&self) {
        if !self.tasks.is_shutdown() {
            tracing::info!(stream = %self.shared.config.name(), "Stopping backup producer");
        }
        self.tasks.shutdown().await;
    }

    fn is_running(&self) -> bool {
        !self.tasks.is_shutdown() && self.tasks.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::fields;
    use sluice_memory::{MemoryLogStore, StoreOp};
    use std::time::Duration;

    /// Config whose background loops stay out of the way of the test
    fn quiet_config(name: &str, max_length: u64) -> BackupStreamConfig {
        let mut config = BackupStreamConfig::new(name)
            .with_transfer_intervals(Duration::from_secs(3600), Duration::from_secs(3600));
        config.stream = config
            .stream
            .with_max_length(max_length)
            .with_cleanup_interval(Duration::from_secs(3600));
        config
    }

    async fn fill_pending(store: &MemoryLogStore, log: &str, n: u64) {
        for i in 0..n {
            store.append(log, &fields! { "seed" => i }).await.unwrap();
        }
        let group = format!("{}_group", log);
        store
            .read_group(log, &group, "c", n as usize, Duration::ZERO)
            .await
            .unwrap();
    }

    #[test]
    fn test_cache_trusts_active_for_slow_timeout() {
        let cache = BackupCache::new(BackupCheckConfig {
            fast_timeout: Duration::from_millis(50),
            slow_timeout: Duration::from_secs(60),
        });
        assert!(!cache.is_active());

        cache.update(true);
        assert!(cache.is_active());

        cache.update(false);
        assert!(!cache.is_active());
    }

    #[tokio::test]
    async fn test_routes_primary_with_capacity() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 5)).await;

        let decision = producer.route().await;
        assert_eq!(decision.route, Route::Primary);
        assert_eq!(decision.reason, RouteReason::PrimaryAvailable);
        // The routing lock is released again
        assert_eq!(store.key_value("stream_lock:jobs"), None);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_lock_error_routes_to_primary() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 5)).await;

        store.fail_op(StoreOp::SetIfAbsent);
        let decision = producer.route().await;
        assert_eq!(decision.route, Route::Primary);
        assert_eq!(decision.reason, RouteReason::LockError);

        let appended = producer
            .add_message(fields! { "k" => "v" })
            .await
            .unwrap();
        assert_eq!(appended.log, "jobs");
        assert_eq!(store.key_value("stream_lock:jobs"), None);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_failed_length_check_marks_backup_inactive() {
        let store = Arc::new(MemoryLogStore::new());
        let config = quiet_config("jobs", 5).with_backup_check(BackupCheckConfig {
            fast_timeout: Duration::ZERO,
            slow_timeout: Duration::ZERO,
        });
        let producer = BackupProducer::start(store.clone(), config).await;
        producer.cache().update(true);

        store.fail_op(StoreOp::Len);
        let decision = producer.route().await;

        assert_eq!(producer.cache().last_observed(), Some(false));
        assert_eq!(decision.route, Route::Primary);
        assert_eq!(decision.reason, RouteReason::PrimaryAvailable);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_pending_error_routes_to_primary() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 5)).await;

        store.fail_op(StoreOp::PendingSummary);
        let decision = producer.route().await;
        assert_eq!(decision.route, Route::Primary);
        assert_eq!(decision.reason, RouteReason::PendingUnknown);
        assert_eq!(store.key_value("stream_lock:jobs"), None);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_transfer_skips_when_saturated() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 3)).await;

        fill_pending(&store, "jobs", 3).await;
        store
            .append("jobs_backup", &fields! { "k" => "v" })
            .await
            .unwrap();

        assert_eq!(producer.transfer_once().await.unwrap(), 0);
        assert_eq!(store.len("jobs_backup").await.unwrap(), 1);
        assert_eq!(store.op_count(StoreOp::ReadFrom), 0);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_transfer_drains_and_marks_inactive() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 100)).await;

        for i in 0..3i64 {
            store
                .append("jobs_backup", &fields! { "i" => i })
                .await
                .unwrap();
        }
        producer.cache().update(true);

        assert_eq!(producer.transfer_once().await.unwrap(), 3);
        assert_eq!(producer.transfer_once().await.unwrap(), 0);
        assert!(!producer.cache().is_active());
        assert_eq!(store.len("jobs").await.unwrap(), 3);

        producer.stop().await;
    }

    #[tokio::test]
    async fn test_failed_transfer_reports_partial_transfer() {
        let store = Arc::new(MemoryLogStore::new());
        let producer = BackupProducer::start(store.clone(), quiet_config("jobs", 100)).await;

        store
            .append("jobs_backup", &fields! { "k" => "v" })
            .await
            .unwrap();
        store.fail_op(StoreOp::Transfer);

        let err = producer.transfer_once().await.unwrap_err();
        assert!(matches!(err, SluiceError::PartialTransfer { .. }));
        assert_eq!(store.len("jobs_backup").await.unwrap(), 1);
        // The lock is released even when the transfer fails
        assert_eq!(store.key_value("stream_lock:jobs"), None);

        producer.stop().await;
    }
}
