//! Configuration loading for sync-engine.
//!
//! Configuration is loaded from a TOML file (default: `relief-sync.toml`).
//! Every field has a default, so a partial or empty file is valid.

use relief_sync_types::{RecordId, DEFAULT_MAX_PAYLOAD};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest payload limit that still carries a batch header plus one
/// record from a UUID-identified device (about 101 bytes framed).
pub const MIN_PAYLOAD_BYTES: usize = 128;

/// Root configuration for a relief-sync device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Sync timing and payload configuration.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Device identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Origin identifier stamped on locally collected records.
    #[serde(default = "default_device_id")]
    pub id: String,
    /// Name advertised to nearby peers.
    #[serde(default = "default_device_name")]
    pub name: String,
}

/// Sync timing and payload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Background loop period in seconds (default: 30).
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// How long one scan waits for a candidate, in seconds (default: 10).
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    /// Timeout for a single radio operation, in seconds (default: 5).
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Timeout for a whole session, in seconds (default: 20).
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// How long a peer is ignored after a session with it (default: 60).
    #[serde(default = "default_peer_cooldown_secs")]
    pub peer_cooldown_secs: u64,
    /// Largest characteristic value in bytes (default: 512).
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

// Default value functions
fn default_device_id() -> String {
    RecordId::new().to_string()
}

fn default_device_name() -> String {
    "relief-sync".to_string()
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_scan_window_secs() -> u64 {
    10
}

fn default_operation_timeout_secs() -> u64 {
    5
}

fn default_session_timeout_secs() -> u64 {
    20
}

fn default_peer_cooldown_secs() -> u64 {
    60
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD
}

fn default_database_path() -> PathBuf {
    PathBuf::from("relief-sync.db")
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: default_device_id(),
            name: default_device_name(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            scan_window_secs: default_scan_window_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            peer_cooldown_secs: default_peer_cooldown_secs(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl SyncConfig {
    /// Background loop period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    /// Scan window.
    pub fn scan_window(&self) -> Duration {
        Duration::from_secs(self.scan_window_secs)
    }

    /// Per-operation timeout.
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Whole-session timeout.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Per-peer cooldown.
    pub fn peer_cooldown(&self) -> Duration {
        Duration::from_secs(self.peer_cooldown_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.id.trim().is_empty() {
            return Err(ConfigError::Invalid("device.id must not be empty".into()));
        }

        let durations = [
            ("sync.tick_interval_secs", self.sync.tick_interval_secs),
            ("sync.scan_window_secs", self.sync.scan_window_secs),
            ("sync.operation_timeout_secs", self.sync.operation_timeout_secs),
            ("sync.session_timeout_secs", self.sync.session_timeout_secs),
            ("sync.peer_cooldown_secs", self.sync.peer_cooldown_secs),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }

        if self.sync.max_payload_bytes < MIN_PAYLOAD_BYTES {
            return Err(ConfigError::Invalid(format!(
                "sync.max_payload_bytes must be at least {MIN_PAYLOAD_BYTES}, got {}",
                self.sync.max_payload_bytes
            )));
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
