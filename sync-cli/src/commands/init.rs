//! Create the device identity and its record store.

use anyhow::Result;
use relief_sync_engine::RecordStore;
use std::path::Path;

use super::open_store;
use crate::config::{engine_config, DeviceIdentity};

/// Run the init command.
///
/// Fails if the data directory already holds a device identity: the
/// device id is the origin of every record this device has produced.
pub async fn run(
    data_dir: &Path,
    config_file: Option<&Path>,
    name: &str,
) -> Result<DeviceIdentity> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("Device name must not be empty");
    }
    if DeviceIdentity::read(data_dir).await?.is_some() {
        anyhow::bail!(
            "{} already holds a device identity; records from it would lose their origin",
            data_dir.display()
        );
    }

    let device = DeviceIdentity::generate(name);
    device.write(data_dir).await?;

    let config = engine_config(data_dir, config_file).await?;
    let store = open_store(&config).await?;
    let held = store.count().await?;

    println!("Device initialized: {} ({})", device.name, device.origin);
    println!("  Store: {} ({} records)", config.storage.database.display(), held);
    println!();
    println!("Record a status with: relief-sync record --lat <lat> --lon <lon>");

    Ok(device)
}
