//! Handler for the `watch` command.

use serde_json::json;
use tokio::signal;
use tracing::{info, warn};

use super::WatchArgs;
use crate::adapter::{ChannelEvent, IndexerFeed, WsConnector};
use crate::error::Result;
use crate::infrastructure::config::settings::Config;

/// Load configuration with CLI overrides applied.
fn load_config(args: &WatchArgs) -> Result<Config> {
    let mut config = Config::load(&args.config)?;

    if let Some(level) = &args.log_level {
        config.logging.level.clone_from(level);
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }

    Ok(config)
}

/// Stream one channel until Ctrl-C, printing each event as a JSON line.
pub async fn execute(args: WatchArgs) -> Result<()> {
    let config = load_config(&args)?;
    config.init_logging();

    let feed = IndexerFeed::spawn(config.connection(), WsConnector::new())?;
    let mut subscription = feed.subscribe(args.channel.clone(), args.id.clone(), !args.unbatched)?;
    info!(
        feed_id = %feed.feed_id(),
        channel = %args.channel,
        id = ?args.id,
        "Watching channel"
    );

    loop {
        tokio::select! {
            event = subscription.recv() => {
                let Some(event) = event else {
                    warn!("Subscription closed");
                    break;
                };
                let line = match event {
                    ChannelEvent::BaseData(contents) => json!({
                        "channel": &args.channel,
                        "id": &args.id,
                        "kind": "base_data",
                        "contents": contents,
                    }),
                    ChannelEvent::Updates(updates) => json!({
                        "channel": &args.channel,
                        "id": &args.id,
                        "kind": "updates",
                        "contents": updates,
                    }),
                };
                println!("{line}");
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    drop(subscription);
    feed.shutdown().await;
    Ok(())
}
