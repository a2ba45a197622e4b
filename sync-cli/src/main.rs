//! # relief-sync
//!
//! CLI tool for relief-sync record stores.
//!
//! ## Commands
//!
//! - `init`: Initialize device identity
//! - `record`: Record a status for this device
//! - `import`: Import records exported from another device
//! - `list`: List stored records
//! - `summary`: Show the per-origin freshness summary
//! - `status`: Show device and store status
//! - `simulate`: Run an in-process mesh of devices
//!
//! ## Example
//!
//! ```bash
//! # Initialize device
//! relief-sync init --name "Field Kit 3"
//!
//! # Record a status
//! relief-sync record --lat -41.29 --lon 174.78 --battery-level 0.55 --battery-state unplugged
//!
//! # Show what this device knows
//! relief-sync list
//! relief-sync summary
//!
//! # Watch four devices converge
//! relief-sync simulate --devices 4 --records 10
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{init, list, record, simulate, status, summary};

/// CLI tool for relief-sync record stores.
#[derive(Parser, Debug)]
#[command(name = "relief-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for device identity and the record store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize device identity
    Init {
        /// Device name
        #[arg(long, short)]
        name: String,
    },

    /// Record a status for this device
    Record {
        /// Latitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Battery level as reported by the device
        #[arg(long, default_value = "unknown")]
        battery_level: String,

        /// Battery state as reported by the device
        #[arg(long, default_value = "unknown")]
        battery_state: String,
    },

    /// Import records exported with `list --json`
    Import {
        /// JSON export file
        file: PathBuf,
    },

    /// List stored records
    List {
        /// Only records from this origin
        #[arg(long)]
        origin: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the per-origin freshness summary
    Summary {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Show device and store status
    Status,

    /// Run an in-process mesh of devices until their stores converge
    Simulate {
        /// Number of devices
        #[arg(long, default_value = "4")]
        devices: usize,

        /// Records each device starts with
        #[arg(long, default_value = "5")]
        records: usize,

        /// Maximum rounds
        #[arg(long, default_value = "10")]
        rounds: usize,

        /// Payload limit in bytes
        #[arg(long, default_value = "512")]
        max_payload: usize,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Init { name } => {
            init::run(&data_dir, config_file, &name).await?;
        }
        Commands::Record {
            lat,
            lon,
            battery_level,
            battery_state,
        } => {
            let config = config::engine_config(&data_dir, config_file).await?;
            record::run(config, lat, lon, &battery_level, &battery_state).await?;
        }
        Commands::Import { file } => {
            let config = config::engine_config(&data_dir, config_file).await?;
            record::import(config, &file).await?;
        }
        Commands::List { origin, json } => {
            let config = config::engine_config(&data_dir, config_file).await?;
            list::run(&config, origin.as_deref(), json).await?;
        }
        Commands::Summary { json } => {
            let config = config::engine_config(&data_dir, config_file).await?;
            summary::run(config, json).await?;
        }
        Commands::Status => {
            status::run(&data_dir, config_file).await?;
        }
        Commands::Simulate {
            devices,
            records,
            rounds,
            max_payload,
            json,
        } => {
            let options = simulate::SimulationOptions {
                devices,
                records,
                rounds,
                max_payload,
            };
            simulate::run(options, json).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for relief-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "relief-sync", "relief-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
