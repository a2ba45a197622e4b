//! CLI command implementations.

pub mod init;
pub mod list;
pub mod record;
pub mod simulate;
pub mod status;
pub mod summary;

use anyhow::{Context, Result};
use relief_sync_engine::{Config, MockRadio, SqliteStore, SyncService};
use std::sync::Arc;

/// Open the device's record store.
pub async fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::new(&config.storage.database)
        .await
        .with_context(|| {
            format!(
                "Failed to open record store at {}",
                config.storage.database.display()
            )
        })
}

/// Build the device's sync service over its on-disk store.
///
/// The CLI has no radio backend of its own, so the service gets an idle
/// mock radio and is only used for its store-facing API.
pub async fn open_service(config: Config) -> Result<SyncService> {
    let store = open_store(&config).await?;
    let radio = MockRadio::with_address(config.device.id.clone());
    SyncService::new(config, Arc::new(store), Arc::new(radio))
        .context("Failed to build sync service")
}
