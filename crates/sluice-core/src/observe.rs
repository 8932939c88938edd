//! Optional metrics instrumentation for sluice.
//!
//! When the `observe` feature is enabled, routing, transfer, cleanup and
//! consumer operations emit counters and histograms via the [`metrics`]
//! crate. A downstream application must install a metrics recorder (e.g.
//! `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record where a backup producer routed a message.
///
/// - `sluice.route.total` – counter with `target` (`primary` / `backup`) and
///   `reason` labels
#[inline]
pub fn record_route(target: &'static str, reason: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("sluice.route.total", "target" => target, "reason" => reason)
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (target, reason);
    }
}

/// Record a lock acquisition attempt.
///
/// - `sluice.lock.attempts_total` – counter with `result` label
///   (`acquired` / `busy` / `error`)
#[inline]
pub fn record_lock_attempt(result: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("sluice.lock.attempts_total", "result" => result).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = result;
    }
}

/// Record a backup-to-primary transfer cycle.
///
/// - `sluice.transfer.cycles_total` – counter
/// - `sluice.transfer.entries_total` – counter of entries moved
#[inline]
pub fn record_transfer(moved: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("sluice.transfer.cycles_total").increment(1);
        metrics::counter!("sluice.transfer.entries_total").increment(moved);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = moved;
    }
}

/// Record a cleanup run (duration + entries deleted).
///
/// - `sluice.cleanup.runs_total` – counter
/// - `sluice.cleanup.deleted_total` – counter
/// - `sluice.cleanup.duration_seconds` – histogram
#[inline]
pub fn record_cleanup(duration: std::time::Duration, deleted: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("sluice.cleanup.runs_total").increment(1);
        metrics::counter!("sluice.cleanup.deleted_total").increment(deleted);
        metrics::histogram!("sluice.cleanup.duration_seconds").record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, deleted);
    }
}

/// Record the outcome of one handler invocation.
///
/// - `sluice.consumer.handled_total` – counter with `outcome` label (`ok` / `fail`)
/// - `sluice.consumer.handle_duration_seconds` – histogram
#[inline]
pub fn record_handled(duration: std::time::Duration, success: bool) {
    #[cfg(feature = "observe")]
    {
        let outcome = if success { "ok" } else { "fail" };
        metrics::counter!("sluice.consumer.handled_total", "outcome" => outcome).increment(1);
        metrics::histogram!("sluice.consumer.handle_duration_seconds")
            .record(duration.as_secs_f64());
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (duration, success);
    }
}

/// Record a background task crash caught at its failure boundary.
///
/// - `sluice.task.crashes_total` – counter with `task` label
#[inline]
pub fn record_task_crash(task: &'static str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("sluice.task.crashes_total", "task" => task).increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = task;
    }
}
