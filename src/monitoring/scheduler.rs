use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::prober::Prober;
use super::status_updater::StatusUpdater;
use crate::db::models::Monitor;
use crate::db::store::{MonitorStore, StoreError};

/// Counts from one due-check sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub due: usize,
    pub failed: usize,
}

/// Resets the in-progress flag even if the sweep task panics.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives due monitors through probe and status update on a fixed tick.
pub struct Scheduler {
    monitors: Arc<dyn MonitorStore>,
    prober: Prober,
    updater: Arc<StatusUpdater>,
    permits: Arc<Semaphore>,
    sweeping: AtomicBool,
}

impl Scheduler {
    pub fn new(
        monitors: Arc<dyn MonitorStore>,
        prober: Prober,
        updater: Arc<StatusUpdater>,
        max_concurrent_checks: usize,
    ) -> Self {
        Self {
            monitors,
            prober,
            updater,
            permits: Arc::new(Semaphore::new(max_concurrent_checks.max(1))),
            sweeping: AtomicBool::new(false),
        }
    }

    pub async fn start_periodic_checks(self: Arc<Self>, period: Duration) {
        info!(interval_seconds = period.as_secs(), "Monitor scheduler started.");
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler.run_tick(Utc::now()).await;
            });
        }
    }

    /// Runs one sweep unless the previous one is still in flight. Returns
    /// `None` when the tick was skipped.
    pub async fn run_tick(&self, now: DateTime<Utc>) -> Option<SweepReport> {
        if self.sweeping.swap(true, Ordering::AcqRel) {
            warn!("Previous monitor sweep still running, skipping this tick.");
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);

        match self.run_sweep(now).await {
            Ok(report) => {
                info!(due = report.due, failed = report.failed, "Monitor sweep finished.");
                Some(report)
            }
            Err(e) => {
                error!(error = %e, "Failed to load due monitors.");
                Some(SweepReport::default())
            }
        }
    }

    /// Checks every monitor due at `now` concurrently. A failure or panic on one
    /// monitor is logged and does not affect the others.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let due = self.monitors.find_due(now).await?;
        debug!(count = due.len(), "Monitors due for a check.");

        let mut report = SweepReport {
            due: due.len(),
            failed: 0,
        };
        let mut tasks = JoinSet::new();
        for monitor in due {
            let permits = Arc::clone(&self.permits);
            let prober = self.prober.clone();
            let updater = Arc::clone(&self.updater);
            let monitor_id = monitor.id;
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                (monitor_id, check_monitor(&prober, &updater, monitor).await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((monitor_id, Ok(()))) => debug!(monitor_id, "Monitor check completed."),
                Ok((monitor_id, Err(e))) => {
                    report.failed += 1;
                    error!(monitor_id, error = %e, "Error checking monitor.");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(error = %e, "Monitor check task aborted.");
                }
            }
        }
        Ok(report)
    }
}

async fn check_monitor(
    prober: &Prober,
    updater: &StatusUpdater,
    monitor: Monitor,
) -> Result<(), StoreError> {
    let probe = prober.probe(&monitor).await;
    let name = monitor.name.clone();
    let outcome = updater.apply(monitor, probe).await?;
    info!(
        monitor_id = outcome.monitor.id,
        monitor = %name,
        status = %outcome.monitor.status,
        latency_ms = outcome.probe.latency_ms,
        "Checked monitor."
    );
    Ok(())
}
