//! Background tick driver.
//!
//! Runs [`SyncWorker::tick`] on a fixed period, and right away whenever the
//! radio comes back to powered-on.

use crate::error::EngineError;
use crate::radio::{PowerState, Radio};
use crate::worker::{SyncWorker, TickOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to the running tick loop.
#[derive(Debug)]
pub struct SyncLoop {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncLoop {
    /// Spawn the loop. The first tick runs immediately.
    pub fn spawn(worker: Arc<SyncWorker>, radio: Arc<dyn Radio>, period: Duration) -> Self {
        let (stop, mut stop_rx) = watch::channel(false);
        let mut power_rx = radio.subscribe_power();

        let handle = tokio::spawn(async move {
            tracing::info!("Sync loop started (interval: {:?})", period);

            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut power_open = true;

            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                    _ = timer.tick() => {}
                    changed = power_rx.changed(), if power_open => {
                        if changed.is_err() {
                            power_open = false;
                            continue;
                        }
                        let state = *power_rx.borrow_and_update();
                        tracing::info!(%state, "radio power changed");
                        if state != PowerState::PoweredOn {
                            continue;
                        }
                    }
                }

                run_tick(&worker).await;
            }

            tracing::info!("Sync loop stopped");
        });

        Self { stop, handle }
    }

    /// Whether the loop task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the loop and wait for it to finish its current tick.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("Sync loop panicked: {}", e);
        }
    }
}

async fn run_tick(worker: &SyncWorker) {
    match worker.tick().await {
        Ok(TickOutcome::Swept { sessions }) => {
            let completed = sessions.iter().filter(|s| s.is_completed()).count();
            if sessions.is_empty() {
                tracing::debug!("Tick: no peers in range");
            } else {
                tracing::info!("Tick: {} sessions, {} completed", sessions.len(), completed);
            }
        }
        Ok(TickOutcome::Busy | TickOutcome::Halted) => {}
        Err(EngineError::RadioUnavailable(state)) => {
            tracing::debug!(%state, "Tick skipped: radio not powered");
        }
        Err(e) => {
            tracing::warn!("Tick error: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SyncMetrics;
    use crate::radio::MockRadio;
    use crate::scanner::PeerScanner;
    use crate::session::{SessionRunner, SessionTiming};
    use crate::store::MemoryStore;
    use relief_sync_types::WireCodec;
    use tokio::sync::broadcast;

    fn worker(radio: &MockRadio, metrics: Arc<SyncMetrics>) -> Arc<SyncWorker> {
        let radio: Arc<dyn Radio> = Arc::new(radio.clone());
        let (events, _) = broadcast::channel(4);
        let scanner = PeerScanner::new(
            radio.clone(),
            metrics.clone(),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        let runner = SessionRunner::new(
            radio.clone(),
            Arc::new(MemoryStore::new()),
            WireCodec::default(),
            SessionTiming::default(),
            metrics.clone(),
            events,
        );
        Arc::new(SyncWorker::new(radio, scanner, runner, metrics))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_on_period() {
        let radio = MockRadio::new();
        let metrics = Arc::new(SyncMetrics::new());
        let sync = SyncLoop::spawn(
            worker(&radio, metrics.clone()),
            Arc::new(radio.clone()),
            Duration::from_secs(30),
        );

        tokio::time::sleep(Duration::from_secs(65)).await;

        assert_eq!(metrics.snapshot().ticks_total, 3);
        assert!(sync.is_running());
        sync.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn power_on_triggers_tick() {
        let radio = MockRadio::new();
        radio.set_power(PowerState::PoweredOff);
        let metrics = Arc::new(SyncMetrics::new());
        let sync = SyncLoop::spawn(
            worker(&radio, metrics.clone()),
            Arc::new(radio.clone()),
            Duration::from_secs(300),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(metrics.snapshot().ticks_skipped_radio, 1);
        assert_eq!(metrics.snapshot().ticks_total, 0);

        radio.set_power(PowerState::PoweredOn);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(metrics.snapshot().ticks_total, 1);

        sync.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_task() {
        let radio = MockRadio::new();
        let sync = SyncLoop::spawn(
            worker(&radio, Arc::new(SyncMetrics::new())),
            Arc::new(radio.clone()),
            Duration::from_secs(30),
        );

        tokio::time::timeout(Duration::from_secs(5), sync.stop())
            .await
            .expect("loop should stop");
    }
}
