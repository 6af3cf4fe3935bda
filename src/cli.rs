//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Tally - per-key real-time counters
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(version)]
#[command(about = "Per-key durable counters with live WebSocket updates")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP and WebSocket server
    Serve(ServeArgs),

    /// Print the effective configuration as TOML
    Config {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Options for `tally serve`; each one overrides the config file.
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:3000)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Store URL: mem:// or rocksdb://<dir>
    #[arg(short, long)]
    pub store: Option<String>,

    /// Stop idle counter instances after this many seconds
    #[arg(long)]
    pub hibernate_after_secs: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}
