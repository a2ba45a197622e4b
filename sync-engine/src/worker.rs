//! Sync Worker.
//!
//! One tick: check the radio, then scan and run sessions until the scanner
//! finds nobody new. Each session ends with the scanner being re-armed, so
//! a single tick can sweep every peer in range. Ticks are single-flight.

use crate::error::EngineError;
use crate::metrics::SyncMetrics;
use crate::radio::Radio;
use crate::scanner::{PeerScanner, ScanOutcome};
use crate::session::{SessionReport, SessionRunner};
use relief_sync_types::PeerId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still running; nothing was done.
    Busy,
    /// The worker is halted; nothing was done.
    Halted,
    /// The tick scanned and ran zero or more sessions.
    Swept {
        /// Sessions in the order they ran.
        sessions: Vec<SessionReport>,
    },
}

/// Runs scan and session sweeps.
pub struct SyncWorker {
    radio: Arc<dyn Radio>,
    scanner: PeerScanner,
    runner: SessionRunner,
    metrics: Arc<SyncMetrics>,
    busy: AtomicBool,
    halted: AtomicBool,
}

impl std::fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncWorker")
            .field("scanner", &self.scanner)
            .field("busy", &self.busy.load(Ordering::Acquire))
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncWorker {
    /// Create a worker.
    pub fn new(
        radio: Arc<dyn Radio>,
        scanner: PeerScanner,
        runner: SessionRunner,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        Self {
            radio,
            scanner,
            runner,
            metrics,
            busy: AtomicBool::new(false),
            halted: AtomicBool::new(false),
        }
    }

    /// The worker's scanner.
    pub fn scanner(&self) -> &PeerScanner {
        &self.scanner
    }

    /// Stop starting new scans and sessions. A session already running
    /// finishes.
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
        self.scanner.stop_scanning();
    }

    /// Allow ticks again after [`halt`](Self::halt).
    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    /// Whether the worker is halted.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Run one tick.
    ///
    /// Fails with [`EngineError::RadioUnavailable`] when the radio is not
    /// powered, and with a scan error if the first scan cannot run. Session
    /// failures are reported in the outcome, not as errors.
    pub async fn tick(&self) -> Result<TickOutcome, EngineError> {
        if self.is_halted() {
            return Ok(TickOutcome::Halted);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            SyncMetrics::incr(&self.metrics.ticks_skipped_busy);
            tracing::debug!("previous tick still running");
            return Ok(TickOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let power = self.radio.power_state();
        if !power.is_powered() {
            SyncMetrics::incr(&self.metrics.ticks_skipped_radio);
            return Err(EngineError::RadioUnavailable(power));
        }
        SyncMetrics::incr(&self.metrics.ticks_total);

        let mut sessions = Vec::new();
        let mut visited: HashSet<PeerId> = HashSet::new();

        loop {
            if self.is_halted() || !self.radio.power_state().is_powered() {
                break;
            }

            let outcome = match self.scanner.start_scanning().await {
                Ok(outcome) => outcome,
                // Sessions already run this tick still count.
                Err(e) if !sessions.is_empty() => {
                    tracing::warn!(error = %e, "rescan failed; ending sweep");
                    break;
                }
                Err(e) => return Err(e),
            };

            let ScanOutcome::Candidate(ad) = outcome else {
                break;
            };
            // A halt that lands while the scan is being torn down must not
            // open a new session.
            if self.is_halted() {
                tracing::debug!(peer = %ad.peer, "halted before session; dropping candidate");
                break;
            }
            if !visited.insert(ad.peer.clone()) {
                tracing::debug!(peer = %ad.peer, "peer already synced this tick");
                break;
            }

            let report = self.runner.run(ad.peer.clone()).await;
            self.scanner.cool_down(&ad.peer);
            let rearm = report.rearm;
            sessions.push(report);
            if !rearm {
                break;
            }
        }

        tracing::debug!(sessions = sessions.len(), "tick finished");
        Ok(TickOutcome::Swept { sessions })
    }
}
