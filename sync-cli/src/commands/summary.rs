//! Show the local freshness summary.

use anyhow::Result;
use relief_sync_engine::Config;
use std::collections::BTreeMap;

use super::open_service;

/// Run the summary command.
pub async fn run(config: Config, json: bool) -> Result<()> {
    let service = open_service(config).await?;
    let summary = service.local_summary().await?;

    if json {
        let entries: BTreeMap<&str, u64> = summary
            .iter()
            .map(|(origin, ts)| (origin.as_str(), ts.as_millis()))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if summary.is_empty() {
        println!("No records.");
        return Ok(());
    }
    println!("{:<40} LATEST", "ORIGIN");
    for (origin, latest) in summary.iter() {
        println!("{:<40} {}", origin.as_str(), latest);
    }
    Ok(())
}
