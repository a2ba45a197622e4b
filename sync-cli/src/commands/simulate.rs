//! Simulate a mesh of devices exchanging records in-process.
//!
//! Every simulated device is a full sync service over a memory store and a
//! mock radio that sees all the other devices. Rounds run each device's
//! sync tick in turn until every store holds every record.

use anyhow::Result;
use relief_sync_engine::{
    Advertisement, Config, MemoryStore, MockRadio, RecordStore, SyncService, TickOutcome,
};
use relief_sync_types::{Record, RecordId, Timestamp};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Simulation parameters.
#[derive(Debug, Clone, Copy)]
pub struct SimulationOptions {
    /// Number of devices.
    pub devices: usize,
    /// Records each device starts with.
    pub records: usize,
    /// Maximum rounds before giving up.
    pub rounds: usize,
    /// Payload limit for every device.
    pub max_payload: usize,
}

/// Per-device result.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceReport {
    /// Device name.
    pub name: String,
    /// Records held at the end.
    pub records: u64,
    /// Sessions this device completed as central.
    pub sessions_completed: u64,
    /// Sessions this device abandoned as central.
    pub sessions_failed: u64,
    /// Records this device pushed, in either role.
    pub records_sent: u64,
}

/// Simulation result.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Rounds that ran.
    pub rounds: usize,
    /// Whether every device ended with every record.
    pub converged: bool,
    /// Records created across all devices.
    pub total_records: usize,
    /// Per-device results.
    pub devices: Vec<DeviceReport>,
}

struct SimDevice {
    name: String,
    service: SyncService,
    radio: MockRadio,
}

impl SimDevice {
    async fn ids(&self) -> Result<BTreeSet<RecordId>> {
        Ok(self
            .service
            .store()
            .scan_all()
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect())
    }
}

const COOLDOWN_SECS: u64 = 1;

/// Run the simulation.
pub async fn simulate(options: SimulationOptions) -> Result<SimulationReport> {
    if options.devices < 2 {
        anyhow::bail!("A mesh needs at least 2 devices, got {}", options.devices);
    }

    let devices = build_mesh(&options)?;
    seed(&devices, options.records).await?;

    let expected: BTreeSet<RecordId> = {
        let mut all = BTreeSet::new();
        for device in &devices {
            all.extend(device.ids().await?);
        }
        all
    };

    let mut rounds = 0;
    let mut converged = false;
    while rounds < options.rounds && !converged {
        if rounds > 0 {
            // Let peers come out of cooldown.
            tokio::time::sleep(Duration::from_secs(COOLDOWN_SECS)).await;
        }
        rounds += 1;

        for device in &devices {
            match device.service.sync_now().await {
                Ok(TickOutcome::Swept { sessions }) => {
                    tracing::debug!(
                        device = %device.name,
                        sessions = sessions.len(),
                        "device swept"
                    );
                }
                Ok(other) => tracing::debug!(device = %device.name, ?other, "tick did not run"),
                Err(e) => tracing::warn!(device = %device.name, error = %e, "tick failed"),
            }
        }

        converged = true;
        for device in &devices {
            if device.ids().await? != expected {
                converged = false;
                break;
            }
        }
        tracing::info!(round = rounds, converged, "round finished");
    }

    let mut reports = Vec::with_capacity(devices.len());
    for device in &devices {
        let metrics = device.service.metrics();
        reports.push(DeviceReport {
            name: device.name.clone(),
            records: device.service.store().count().await?,
            sessions_completed: metrics.sessions_completed,
            sessions_failed: metrics.sessions_failed,
            records_sent: metrics.records_sent,
        });
    }

    Ok(SimulationReport {
        rounds,
        converged,
        total_records: expected.len(),
        devices: reports,
    })
}

/// Run the simulate command.
pub async fn run(options: SimulationOptions, json: bool) -> Result<()> {
    let report = simulate(options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{:<10} {:>8} {:>10} {:>8} {:>6}",
        "DEVICE", "RECORDS", "COMPLETED", "FAILED", "SENT"
    );
    for d in &report.devices {
        println!(
            "{:<10} {:>8} {:>10} {:>8} {:>6}",
            d.name, d.records, d.sessions_completed, d.sessions_failed, d.records_sent
        );
    }
    println!();
    if report.converged {
        println!(
            "Converged: all {} devices hold {} records after {} rounds",
            report.devices.len(),
            report.total_records,
            report.rounds
        );
    } else {
        println!(
            "Not converged after {} rounds ({} records expected per device)",
            report.rounds, report.total_records
        );
    }
    Ok(())
}

fn build_mesh(options: &SimulationOptions) -> Result<Vec<SimDevice>> {
    let mut devices = Vec::with_capacity(options.devices);
    for i in 0..options.devices {
        let name = format!("sim-{i}");
        let mut config = Config::default();
        config.device.id = name.clone();
        config.device.name = name.clone();
        config.sync.scan_window_secs = 1;
        config.sync.peer_cooldown_secs = COOLDOWN_SECS;
        config.sync.max_payload_bytes = options.max_payload;

        let radio = MockRadio::with_address(name.clone());
        radio.set_scan_snapshot(true);
        let service = SyncService::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(radio.clone()),
        )?;
        devices.push(SimDevice {
            name,
            service,
            radio,
        });
    }

    for device in &devices {
        for other in devices.iter().filter(|d| d.name != device.name) {
            device.radio.add_peer(
                Advertisement::sync_peer(other.name.as_str(), &other.name),
                Some(other.service.peripheral()),
            );
        }
    }
    Ok(devices)
}

async fn seed(devices: &[SimDevice], records: usize) -> Result<()> {
    let base = Timestamp::now().as_millis();
    for (i, device) in devices.iter().enumerate() {
        for k in 0..records {
            // Distinct timestamps per origin keep every record individually sendable.
            let record = Record::with_timestamp(
                device.service.origin().clone(),
                Timestamp::from_millis(base + k as u64),
                -41.28 + i as f64 * 0.01,
                174.77 + k as f64 * 0.001,
                format!("{:.2}", 1.0 - k as f64 / (records.max(1) as f64 * 2.0)),
                "unplugged",
            );
            device.service.submit_local_record(&record).await?;
        }
    }
    Ok(())
}
