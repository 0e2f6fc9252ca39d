//! Command-line interface definitions.

pub mod check;
pub mod watch;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tradelink - resilient indexer streaming for trading clients.
#[derive(Parser, Debug)]
#[command(name = "tradelink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a channel from the indexer and print events as JSON lines
    Watch(WatchArgs),

    /// Run diagnostic checks
    #[command(subcommand)]
    Check(CheckCommand),
}

/// Subcommands for `tradelink check`
#[derive(Subcommand, Debug)]
pub enum CheckCommand {
    /// Validate configuration file
    Config(ConfigPathArg),
}

/// Shared argument for commands that only need a config path.
#[derive(Parser, Debug)]
pub struct ConfigPathArg {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Indexer channel to subscribe to (e.g. v4_trades)
    #[arg(long)]
    pub channel: String,

    /// Id within the channel (e.g. a market ticker)
    #[arg(long)]
    pub id: Option<String>,

    /// Ask the indexer for one message per update instead of batches
    #[arg(long)]
    pub unbatched: bool,

    /// Override log level (debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Use JSON log format instead of pretty
    #[arg(long)]
    pub json_logs: bool,
}
