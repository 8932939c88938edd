//! Sluice CLI - inspect default configurations and simulate failover

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "sluicectl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the default configuration for a stream as JSON
    Config {
        /// Which configuration to print
        #[arg(value_enum)]
        kind: ConfigKind,

        /// Stream (log) name
        name: String,
    },

    /// Run a backup-producer / slow-consumer scenario in memory
    Simulate {
        /// JSON scenario file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of messages to publish
        #[arg(short, long)]
        messages: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ConfigKind {
    /// Plain stream (simple producer)
    Stream,
    /// Stream with a backup log (backup producer)
    Backup,
    /// Consumer-group reader
    Consumer,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Commands::Config { kind, name } => {
            commands::config::execute(kind, &name)?;
        }
        Commands::Simulate { config, messages } => {
            commands::simulate::execute(config, messages).await?;
        }
    }

    Ok(())
}
