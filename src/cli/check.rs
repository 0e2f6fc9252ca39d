//! Configuration validation command.

use std::path::Path;

use crate::error::Result;
use crate::infrastructure::config::settings::{Config, WS_URL_ENV};

/// Validate a configuration file without connecting to anything.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());
    println!();

    let config = Config::load(path)?;

    println!("✓ Configuration file is valid");
    println!();
    println!("Summary:");
    println!("  Indexer: {}", config.indexer.ws_url);
    if std::env::var(WS_URL_ENV).is_ok_and(|v| !v.trim().is_empty()) {
        println!("    (overridden by {WS_URL_ENV})");
    }
    println!(
        "  Reconnect: {}ms initial, {}ms max, x{}",
        config.reconnection.initial_delay_ms,
        config.reconnection.max_delay_ms,
        config.reconnection.backoff_multiplier
    );
    println!(
        "  Logging: {} ({})",
        config.logging.level, config.logging.format
    );
    println!();
    println!("Configuration is ready to use.");

    Ok(())
}
