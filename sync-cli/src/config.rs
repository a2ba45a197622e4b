//! Device identity and engine configuration for the CLI.
//!
//! A data directory holds `device.json` (the identity written by `init`)
//! and, unless the config file points elsewhere, the SQLite record store.

use anyhow::{Context, Result};
use relief_sync_engine::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const IDENTITY_FILE: &str = "device.json";

/// Who this device is. Its origin stamps every record it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Origin id of local records (UUID v4).
    pub origin: String,
    /// Name advertised to peers.
    pub name: String,
    /// Unix seconds at `init`.
    pub initialized_at: u64,
}

impl DeviceIdentity {
    /// Fresh identity with a random origin.
    pub fn generate(name: &str) -> Self {
        Self {
            origin: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            initialized_at: unix_now(),
        }
    }

    /// Path of the identity file inside `data_dir`.
    pub fn path(data_dir: &Path) -> PathBuf {
        data_dir.join(IDENTITY_FILE)
    }

    /// Read the identity, or `None` if the directory was never initialized.
    pub async fn read(data_dir: &Path) -> Result<Option<Self>> {
        let path = Self::path(data_dir);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let identity = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a valid device identity", path.display()))?;
        Ok(Some(identity))
    }

    /// Read the identity, failing with a hint if `init` has not run.
    pub async fn require(data_dir: &Path) -> Result<Self> {
        Self::read(data_dir)
            .await?
            .context("Device not initialized. Run 'relief-sync init --name <name>' first.")
    }

    /// Write the identity, readable by the owner only.
    pub async fn write(&self, data_dir: &Path) -> Result<()> {
        let path = Self::path(data_dir);
        tokio::fs::write(&path, serde_json::to_vec_pretty(self)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        restrict_to_owner(&path).await
    }
}

/// Build the engine configuration for this device.
///
/// Starts from the TOML file if one is given, then applies the stored
/// identity. A relative database path is resolved against the data
/// directory.
pub async fn engine_config(data_dir: &Path, config_file: Option<&Path>) -> Result<Config> {
    let mut config = match config_file {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let identity = DeviceIdentity::require(data_dir).await?;
    config.device.id = identity.origin;
    config.device.name = identity.name;

    if config.storage.database.is_relative() {
        config.storage.database = data_dir.join(&config.storage.database);
    }

    config.validate()?;
    Ok(config)
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .with_context(|| format!("Failed to restrict permissions on {}", path.display()))
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}
