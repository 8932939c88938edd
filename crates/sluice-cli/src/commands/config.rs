//! Config command implementation

use crate::ConfigKind;
use anyhow::{Context, Result};
use sluice_core::{BackupStreamConfig, ConsumerConfig, StreamConfig};

pub fn render(kind: ConfigKind, name: &str) -> Result<String> {
    let json = match kind {
        ConfigKind::Stream => serde_json::to_string_pretty(&StreamConfig::new(name)),
        ConfigKind::Backup => serde_json::to_string_pretty(&BackupStreamConfig::new(name)),
        ConfigKind::Consumer => serde_json::to_string_pretty(&ConsumerConfig::new(name)),
    };
    json.context("Failed to serialize configuration")
}

pub fn execute(kind: ConfigKind, name: &str) -> Result<()> {
    println!("{}", render(kind, name)?);
    Ok(())
}
