//! Record a local status.

use anyhow::{Context, Result};
use relief_sync_engine::{Config, IngestOutcome};
use relief_sync_types::Record;
use std::path::Path;

use super::open_service;

/// Run the record command.
pub async fn run(
    config: Config,
    latitude: f64,
    longitude: f64,
    battery_level: &str,
    battery_state: &str,
) -> Result<Record> {
    if !(-90.0..=90.0).contains(&latitude) {
        anyhow::bail!("Latitude must be between -90 and 90, got {latitude}");
    }
    if !(-180.0..=180.0).contains(&longitude) {
        anyhow::bail!("Longitude must be between -180 and 180, got {longitude}");
    }

    let service = open_service(config).await?;
    let record = service
        .record_local(latitude, longitude, battery_level, battery_state)
        .await
        .context("Failed to store record")?;

    println!("Recorded {}", record.id);
    println!("  Origin:   {}", record.origin);
    println!("  Position: {}, {}", record.latitude, record.longitude);
    println!("  Battery:  {} ({})", record.battery_level, record.battery_state);
    println!("  Time:     {}", record.timestamp);

    Ok(record)
}

/// Import records exported from another device with `list --json`.
///
/// Returns how many were new and how many were already held.
pub async fn import(config: Config, path: &Path) -> Result<(usize, usize)> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records: Vec<Record> = serde_json::from_str(&contents).context("Invalid record export")?;

    let service = open_service(config).await?;
    let (mut inserted, mut duplicates) = (0, 0);
    for record in &records {
        match service
            .submit_local_record(record)
            .await
            .with_context(|| format!("Failed to store record {}", record.id))?
        {
            IngestOutcome::Inserted => inserted += 1,
            IngestOutcome::Duplicate => duplicates += 1,
        }
    }

    println!(
        "Imported {} records ({} new, {} already held)",
        records.len(),
        inserted,
        duplicates
    );
    Ok((inserted, duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{engine_config, DeviceIdentity};
    use relief_sync_engine::RecordStore;
    use tempfile::{tempdir, TempDir};

    async fn setup() -> (TempDir, Config) {
        let dir = tempdir().unwrap();
        DeviceIdentity::generate("kit").write(dir.path()).await.unwrap();
        let config = engine_config(dir.path(), None).await.unwrap();
        (dir, config)
    }

    #[tokio::test]
    async fn record_is_stored_under_device_origin() {
        let (_dir, config) = setup().await;
        let origin = config.device.id.clone();

        let record = run(config.clone(), -41.29, 174.78, "0.55", "unplugged")
            .await
            .unwrap();

        assert_eq!(record.origin.as_str(), origin);
        let store = crate::commands::open_store(&config).await.unwrap();
        assert_eq!(store.get(&record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn out_of_range_position_is_rejected() {
        let (_dir, config) = setup().await;

        assert!(run(config.clone(), 91.0, 0.0, "1.0", "full").await.is_err());
        assert!(run(config, 0.0, -181.0, "1.0", "full").await.is_err());
    }

    #[tokio::test]
    async fn import_is_idempotent() {
        let (dir, config) = setup().await;
        let records = vec![
            Record::new("other-kit".into(), 1.0, 2.0, "0.2", "charging"),
            Record::new("other-kit".into(), 1.5, 2.5, "0.1", "unplugged"),
        ];
        let file = dir.path().join("export.json");
        tokio::fs::write(&file, serde_json::to_string(&records).unwrap())
            .await
            .unwrap();

        assert_eq!(import(config.clone(), &file).await.unwrap(), (2, 0));
        assert_eq!(import(config, &file).await.unwrap(), (0, 2));
    }

    #[tokio::test]
    async fn import_rejects_garbage() {
        let (dir, config) = setup().await;
        let file = dir.path().join("export.json");
        tokio::fs::write(&file, "not json").await.unwrap();

        assert!(import(config, &file).await.is_err());
    }
}
