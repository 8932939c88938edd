//! Simulate command implementation
//!
//! Publishes a burst of messages through a backup producer while a slow
//! consumer drains the primary log, then reports where messages landed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sluice::prelude::*;
use sluice_memory::MemoryLogStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scenario description, loadable from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default = "default_producer")]
    pub producer: BackupStreamConfig,

    /// Consumer settings; defaults to a consumer on the producer's log
    #[serde(default)]
    pub consumer: Option<ConsumerConfig>,

    /// Messages published in the burst
    /// Default: 200
    #[serde(default = "default_messages")]
    pub messages: u64,

    /// Time the handler spends on each message, in milliseconds
    /// Default: 5
    #[serde(default = "default_handler_delay_ms")]
    pub handler_delay_ms: u64,

    /// How long to keep draining after the burst, in milliseconds
    /// Default: 3000
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

fn default_producer() -> BackupStreamConfig {
    let mut config = BackupStreamConfig::new("simulated")
        .with_transfer_intervals(Duration::from_millis(50), Duration::from_millis(200));
    config.stream = config.stream.with_max_length(20);
    config
}

fn default_messages() -> u64 {
    200
}

fn default_handler_delay_ms() -> u64 {
    5
}

fn default_drain_ms() -> u64 {
    3000
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            producer: default_producer(),
            consumer: None,
            messages: default_messages(),
            handler_delay_ms: default_handler_delay_ms(),
            drain_ms: default_drain_ms(),
        }
    }
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        let mut scenario: Scenario =
            serde_json::from_str(&raw).context("Failed to parse scenario")?;
        scenario.producer = scenario.producer.normalized();
        Ok(scenario)
    }

    fn consumer_config(&self) -> ConsumerConfig {
        self.consumer
            .clone()
            .unwrap_or_else(|| {
                ConsumerConfig::new(self.producer.name())
                    .with_read_count(5)
                    .with_block_duration(Duration::from_millis(50))
            })
            .normalized()
    }
}

/// What happened during a run
#[derive(Debug, Default, Clone, Serialize)]
pub struct Outcome {
    pub published: u64,
    pub to_primary: u64,
    pub to_backup: u64,
    pub handled: u64,
    pub primary_len: u64,
    pub backup_len: u64,
}

pub async fn run(scenario: &Scenario) -> Result<Outcome> {
    let store = Arc::new(MemoryLogStore::new());
    let ctx = StreamContext::new(store.clone());
    ctx.init().await?;
    let manager = ctx.manager()?;

    let handled = Arc::new(AtomicU64::new(0));
    let delay = Duration::from_millis(scenario.handler_delay_ms);
    let handler = {
        let handled = handled.clone();
        handler_fn(move |_entry: Entry| {
            let handled = handled.clone();
            async move {
                tokio::time::sleep(delay).await;
                handled.fetch_add(1, Ordering::SeqCst);
                Ok::<(), anyhow::Error>(())
            }
        })
    };

    let producer = manager
        .create_backup_producer("simulator", scenario.producer.clone())
        .await?;
    manager
        .create_custom_consumer("simulator", scenario.consumer_config(), handler, true)
        .await?;

    let mut outcome = Outcome::default();
    let backup_log = scenario.producer.clone().normalized().backup_log;
    for i in 0..scenario.messages {
        let appended = producer
            .add_message(fields! { "seq" => i, "source" => "sluicectl" })
            .await?;
        outcome.published += 1;
        if appended.log == backup_log {
            outcome.to_backup += 1;
        } else {
            outcome.to_primary += 1;
        }
    }

    tokio::time::sleep(Duration::from_millis(scenario.drain_ms)).await;

    outcome.handled = handled.load(Ordering::SeqCst);
    outcome.primary_len = store.len(producer.log_name()).await?;
    outcome.backup_len = store.len(&backup_log).await?;

    ctx.shutdown().await;
    Ok(outcome)
}

pub async fn execute(config: Option<PathBuf>, messages: Option<u64>) -> Result<()> {
    let mut scenario = match config {
        Some(path) => Scenario::load(&path)?,
        None => Scenario::default(),
    };
    if let Some(messages) = messages {
        scenario.messages = messages;
    }

    tracing::info!(
        stream = %scenario.producer.name(),
        messages = scenario.messages,
        max_length = scenario.producer.stream.max_length,
        "Running simulation"
    );

    let outcome = run(&scenario).await?;

    println!("\nSimulation Result");
    println!("{}", "=".repeat(60));
    println!("Published:       {}", outcome.published);
    println!("  to primary:    {}", outcome.to_primary);
    println!("  to backup:     {}", outcome.to_backup);
    println!("Handled:         {}", outcome.handled);
    println!("Primary length:  {}", outcome.primary_len);
    println!("Backup length:   {}", outcome.backup_len);

    if outcome.backup_len > 0 {
        println!(
            "\n{} message(s) still waiting in the backup log",
            outcome.backup_len
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_partial_scenario() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "producer": {{ "name": "orders", "max_length": 3 }}, "messages": 7 }}"#
        )
        .unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.messages, 7);
        assert_eq!(scenario.producer.stream.max_length, 3);
        assert_eq!(scenario.producer.backup_log, "orders_backup");
        assert_eq!(scenario.consumer_config().group, "orders_group");
        assert_eq!(scenario.drain_ms, 3000);
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Scenario::load(file.path()).is_err());
    }

    #[tokio::test]
    async fn test_overflow_goes_to_backup_and_drains() {
        let mut scenario = Scenario::default();
        scenario.messages = 30;
        scenario.handler_delay_ms = 1;
        scenario.drain_ms = 2000;
        scenario.consumer = Some(
            ConsumerConfig::new("simulated")
                .with_read_count(50)
                .with_block_duration(Duration::from_secs(5)),
        );

        let outcome = run(&scenario).await.unwrap();

        assert_eq!(outcome.published, 30);
        assert_eq!(outcome.to_primary + outcome.to_backup, 30);
        assert_eq!(outcome.backup_len, 0);
        assert_eq!(outcome.handled, 30);
    }
}
