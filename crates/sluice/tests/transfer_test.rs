//! Backup-to-primary transfer

use sluice::prelude::*;
use sluice::SluiceError;
use sluice_memory::{MemoryLogStore, StoreOp};
use std::sync::Arc;
use std::time::Duration;

fn config(name: &str, max_length: u64, interval: Duration) -> BackupStreamConfig {
    let mut config = BackupStreamConfig::new(name)
        .with_transfer_batch_size(10)
        .with_transfer_intervals(interval, interval);
    config.stream = config
        .stream
        .with_max_length(max_length)
        .with_cleanup_interval(Duration::from_secs(3600));
    config
}

async fn seed_backup(store: &MemoryLogStore, backup: &str, n: u64) -> Vec<Fields> {
    let mut seeded = Vec::new();
    for i in 0..n {
        let fields = fields! { "job" => i, "payload" => format!("body-{}", i) };
        store.append(backup, &fields).await.unwrap();
        seeded.push(fields);
    }
    seeded
}

#[tokio::test]
async fn test_transfer_moves_exactly_available_capacity() {
    let store = Arc::new(MemoryLogStore::new());
    let producer =
        BackupProducer::start(store.clone(), config("jobs", 5, Duration::from_secs(3600))).await;

    // Two entries pending in the primary leave room for three
    for i in 0..2u64 {
        store.append("jobs", &fields! { "old" => i }).await.unwrap();
    }
    store
        .read_group("jobs", "jobs_group", "worker", 10, Duration::ZERO)
        .await
        .unwrap();

    let seeded = seed_backup(&store, "jobs_backup", 8).await;

    let moved = producer.transfer_once().await.unwrap();
    assert_eq!(moved, 3);
    assert_eq!(store.len("jobs_backup").await.unwrap(), 5);

    let primary = store.entries("jobs");
    let transferred: Vec<Fields> = primary[2..].iter().map(|e| e.fields.clone()).collect();
    assert_eq!(transferred, seeded[..3].to_vec());

    // What is left in the backup is the untouched tail, in order
    let remaining: Vec<Fields> = store
        .entries("jobs_backup")
        .into_iter()
        .map(|e| e.fields)
        .collect();
    assert_eq!(remaining, seeded[3..].to_vec());

    producer.stop().await;
}

#[tokio::test]
async fn test_transfer_waits_for_lock() {
    let store = Arc::new(MemoryLogStore::new());
    let producer =
        BackupProducer::start(store.clone(), config("jobs", 5, Duration::from_secs(3600))).await;
    seed_backup(&store, "jobs_backup", 2).await;

    let lock = sluice::DistributedLock::for_stream(store.clone(), "jobs");
    let lease = lock
        .try_acquire(Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(producer.transfer_once().await.unwrap(), 0);
    assert_eq!(store.len("jobs_backup").await.unwrap(), 2);

    lock.release(&lease).await.unwrap();
    assert_eq!(producer.transfer_once().await.unwrap(), 2);

    producer.stop().await;
}

#[tokio::test]
async fn test_failed_pipeline_moves_nothing() {
    let store = Arc::new(MemoryLogStore::new());
    let producer =
        BackupProducer::start(store.clone(), config("jobs", 5, Duration::from_secs(3600))).await;
    seed_backup(&store, "jobs_backup", 4).await;

    store.fail_op(StoreOp::Transfer);
    let err = producer.transfer_once().await.unwrap_err();
    assert!(matches!(err, SluiceError::PartialTransfer { .. }));
    assert_eq!(store.len("jobs_backup").await.unwrap(), 4);
    assert_eq!(store.len("jobs").await.unwrap(), 0);

    // Safe to retry once the store recovers
    store.clear_failure(StoreOp::Transfer);
    assert_eq!(producer.transfer_once().await.unwrap(), 4);

    producer.stop().await;
}

#[tokio::test]
async fn test_background_loop_drains_backup() {
    let store = Arc::new(MemoryLogStore::new());
    let producer =
        BackupProducer::start(store.clone(), config("jobs", 100, Duration::from_millis(20))).await;
    seed_backup(&store, "jobs_backup", 25).await;

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.len("jobs_backup").await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(drained.is_ok(), "backup was not drained");
    assert_eq!(store.len("jobs").await.unwrap(), 25);

    producer.stop().await;
}
