//! Backup producer failover demo
//!
//! A primary log with room for five unacknowledged entries is fed faster
//! than its consumer keeps up. Overflow lands in `jobs_backup` and is moved
//! back into `jobs` as the consumer acknowledges work.

use sluice::prelude::*;
use sluice_memory::MemoryLogStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let store = Arc::new(MemoryLogStore::new());

    let mut config = BackupStreamConfig::new("jobs")
        .with_transfer_intervals(Duration::from_millis(50), Duration::from_millis(200));
    config.stream = config.stream.with_max_length(5);
    let producer = BackupProducer::start(store.clone(), config).await;

    let consumer = StreamConsumer::new(
        store.clone(),
        ConsumerConfig::new("jobs")
            .with_read_count(1)
            .with_block_duration(Duration::from_millis(50)),
        handler_fn(|entry: Entry| async move {
            // Simulate slow work
            tokio::time::sleep(Duration::from_millis(30)).await;
            println!("  processed {}", entry.id);
            Ok::<(), anyhow::Error>(())
        }),
    )
    .await;
    consumer.start()?;

    println!("Publishing 20 jobs...");
    for i in 0..20 {
        let appended = producer.add_message(fields! { "job" => i }).await?;
        println!("job {:>2} -> {}", i, appended.log);
    }

    tokio::time::sleep(Duration::from_secs(2)).await;

    println!(
        "\nprimary length: {}, backup length: {}",
        store.len("jobs").await?,
        store.len("jobs_backup").await?
    );

    consumer.stop().await;
    producer.stop().await;
    Ok(())
}
