//! Retention: trims never cross the earliest pending entry or a protected window

use chrono::Utc;
use sluice::prelude::*;
use sluice::TrimBoundary;
use sluice_memory::MemoryLogStore;
use std::sync::Arc;
use std::time::Duration;

const MINUTE_MS: u64 = 60_000;

/// Seed entries aged in minutes, oldest first, returning their ids
fn seed_aged(store: &MemoryLogStore, log: &str, ages_min: &[u64]) -> Vec<EntryId> {
    let now = Utc::now().timestamp_millis() as u64;
    ages_min
        .iter()
        .map(|age| {
            store
                .append_with_id(
                    log,
                    EntryId::at_millis(now - age * MINUTE_MS),
                    fields! { "age_min" => *age },
                )
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn test_age_trim_removes_only_older_entries() {
    let store = Arc::new(MemoryLogStore::new());
    let cleanup = CleanupManager::new(store.clone());
    seed_aged(&store, "audit", &[600, 300, 90, 65, 55, 20, 5, 0]);

    let config = StreamConfig::new("audit")
        .with_max_age(Duration::from_secs(3600))
        .with_min_retention_count(0);
    let report = cleanup.cleanup_stream(&config).await.unwrap();

    assert_eq!(report.deleted, 4);
    let survivors: Vec<u64> = store
        .entries("audit")
        .iter()
        .filter_map(|e| e.fields.get("age_min").and_then(|v| v.as_u64()))
        .collect();
    assert_eq!(survivors, vec![55, 20, 5, 0]);
}

#[tokio::test]
async fn test_ack_bound_overrides_age_and_priority() {
    let store = Arc::new(MemoryLogStore::new());
    let cleanup = CleanupManager::new(store.clone());
    store
        .create_group("audit", "audit_group", EntryId::MIN)
        .await
        .unwrap();
    let ids = seed_aged(&store, "audit", &[600, 500, 400, 300, 200]);

    // Deliver the two oldest, acknowledge only the first
    let delivered = store
        .read_group("audit", "audit_group", "w", 2, Duration::ZERO)
        .await
        .unwrap();
    store.ack("audit", "audit_group", &[delivered[0].id]).await.unwrap();

    let config = StreamConfig::new("audit")
        .with_priority(Priority::High)
        .with_max_age(Duration::from_secs(60))
        .with_min_retention_time(Duration::from_secs(60));
    let report = cleanup.cleanup_stream(&config).await.unwrap();

    assert_eq!(report.boundary, TrimBoundary::ById(ids[1]));
    assert_eq!(report.deleted, 1);
    let earliest = store.entries("audit")[0].id;
    assert_eq!(earliest, ids[1]);
}

#[tokio::test]
async fn test_high_priority_keeps_retention_window() {
    let store = Arc::new(MemoryLogStore::new());
    let cleanup = CleanupManager::new(store.clone());
    seed_aged(&store, "audit", &[120, 45, 25, 10]);

    // Age alone would remove everything older than 5 minutes
    let config = StreamConfig::new("audit")
        .with_priority(Priority::Critical)
        .with_max_age(Duration::from_secs(5 * 60))
        .with_min_retention_time(Duration::from_secs(30 * 60));
    let report = cleanup.cleanup_stream(&config).await.unwrap();

    assert_eq!(report.deleted, 2);
    assert_eq!(report.remaining, 2);
}

#[tokio::test]
async fn test_absent_log_succeeds_with_zero_deletions() {
    let store = Arc::new(MemoryLogStore::new());
    let cleanup = CleanupManager::new(store);

    let report = cleanup
        .cleanup_stream(&StreamConfig::new("never_written"))
        .await
        .unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn test_producer_cleanup_loop_runs() {
    let store = Arc::new(MemoryLogStore::new());
    seed_aged(&store, "metrics", &[300, 200, 1]);

    let config = StreamConfig::new("metrics")
        .with_max_age(Duration::from_secs(3600))
        .with_cleanup_interval(Duration::from_millis(20));
    let producer = SimpleProducer::start(store.clone(), config).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.len("metrics").await.unwrap(), 1);

    producer.stop().await;
}
