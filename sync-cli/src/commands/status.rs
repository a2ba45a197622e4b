//! Show the device identity and what its store holds.

use anyhow::Result;
use relief_sync_engine::RecordStore;
use std::path::Path;

use super::open_service;
use crate::config::{engine_config, unix_now, DeviceIdentity};

/// Run the status command.
pub async fn run(data_dir: &Path, config_file: Option<&Path>) -> Result<()> {
    let Some(identity) = DeviceIdentity::read(data_dir).await? else {
        println!("No device identity in {}.", data_dir.display());
        println!("Run 'relief-sync init --name <name>' to create one.");
        return Ok(());
    };

    let config = engine_config(data_dir, config_file).await?;
    let database = config.storage.database.clone();
    let tick = config.sync.tick_interval_secs;
    let cooldown = config.sync.peer_cooldown_secs;
    let service = open_service(config).await?;
    let count = service.store().count().await?;
    let summary = service.local_summary().await?;
    let own = summary.latest(service.origin());
    let newest = summary.iter().map(|(_, ts)| *ts).max();

    println!("Device {} ({})", identity.name, identity.origin);
    println!("  Initialized:   {}", describe_age(identity.initialized_at));
    println!("  Store:         {}", database.display());
    println!("  Records:       {} from {} origins", count, summary.len());
    match own {
        Some(ts) => println!("  Last local:    {}", describe_age(ts.as_millis() / 1000)),
        None => println!("  Last local:    never"),
    }
    if let Some(ts) = newest {
        println!("  Newest record: {}", describe_age(ts.as_millis() / 1000));
    }
    println!("  Sync tick:     every {}s, peer cooldown {}s", tick, cooldown);

    Ok(())
}

/// How long ago a Unix-seconds instant was.
fn describe_age(secs: u64) -> String {
    let age = unix_now().saturating_sub(secs);
    match age {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{} min ago", age / 60),
        3600..=86399 => format!("{} h ago", age / 3600),
        _ => format!("{} days ago", age / 86400),
    }
}
