//! Stream manager demo: registry, handler failures and retention

use sluice::prelude::*;
use sluice_memory::MemoryLogStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let store = Arc::new(MemoryLogStore::new());
    let ctx = StreamContext::new(store.clone());
    ctx.init().await?;

    let manager = ctx.manager()?;
    manager
        .create_simple_stream_producer("signups", "signups")
        .await?;

    // Reject users without an email; those entries stay pending
    let handler = handler_fn(|entry: Entry| async move {
        match entry.fields.get("email").and_then(|v| v.as_str()) {
            Some(email) => {
                println!("welcome mail to {}", email);
                Ok(())
            }
            None => anyhow::bail!("entry {} has no email", entry.id),
        }
    });
    manager
        .create_custom_consumer(
            "mailer",
            ConsumerConfig::new("signups").with_block_duration(Duration::from_millis(50)),
            handler,
            true,
        )
        .await?;

    ctx.add_message("signups", fields! { "user" => "ada", "email" => "ada@example.com" })
        .await?;
    ctx.add_message("signups", fields! { "user" => "bob" }).await?;
    ctx.add_message("signups", fields! { "user" => "eve", "email" => "eve@example.com" })
        .await?;

    tokio::time::sleep(Duration::from_millis(300)).await;

    println!("producers: {:?}", manager.list_producers().await);
    println!("consumers: {:?}", manager.list_consumers().await);
    println!(
        "still pending: {:?}",
        store.pending_ids("signups", "signups_group")
    );

    // Trim everything older than the earliest pending entry
    let cleanup = CleanupManager::new(store.clone());
    let report = cleanup
        .cleanup_stream(&StreamConfig::new("signups").with_max_age(Duration::from_millis(1)))
        .await?;
    println!(
        "cleanup deleted {} entries, {} remain",
        report.deleted, report.remaining
    );

    ctx.shutdown().await;
    Ok(())
}
