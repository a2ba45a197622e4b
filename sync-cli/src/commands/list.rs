//! List stored records.

use anyhow::Result;
use relief_sync_engine::{Config, RecordStore};
use relief_sync_types::{OriginId, Record};

use super::open_store;

/// Load records, oldest first, optionally for one origin.
pub async fn collect(config: &Config, origin: Option<&str>) -> Result<Vec<Record>> {
    let store = open_store(config).await?;
    let mut records = match origin {
        Some(origin) => store.scan_origin(&OriginId::from(origin)).await?,
        None => store.scan_all().await?,
    };
    records.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.origin.cmp(&b.origin))
    });
    Ok(records)
}

/// Run the list command.
pub async fn run(config: &Config, origin: Option<&str>, json: bool) -> Result<()> {
    let records = collect(config, origin).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    for r in &records {
        println!(
            "{}  {:<24} {:>10.5} {:>11.5}  {} ({})  {}",
            r.timestamp, r.origin, r.latitude, r.longitude, r.battery_level, r.battery_state, r.id
        );
    }
    println!();
    println!("{} records", records.len());
    Ok(())
}
