use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::db::enums::{MonitorStatus, ProbeStatus};
use crate::db::models::{Monitor, ProbeResult};
use crate::db::store::{HistoryStore, MonitorStore, StoreError};

/// Weight of the newest observation in the smoothed uptime.
pub const UPTIME_WEIGHT: f64 = 0.1;

/// Exponential moving average of availability. The first observation sets
/// the value directly.
pub fn next_uptime(previous: Option<f64>, status: ProbeStatus) -> f64 {
    let sample = match status {
        ProbeStatus::Up => 100.0,
        ProbeStatus::Down => 0.0,
    };
    let value = match previous {
        None => sample,
        Some(prev) => prev * (1.0 - UPTIME_WEIGHT) + sample * UPTIME_WEIGHT,
    };
    value.clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: MonitorStatus,
    pub to: MonitorStatus,
}

impl Transition {
    /// A change between two known states. Leaving `unknown` is a baseline, not a transition.
    pub fn detect(from: MonitorStatus, to: MonitorStatus) -> Option<Self> {
        (from != MonitorStatus::Unknown && from != to).then_some(Self { from, to })
    }
}

/// Everything downstream consumers need to know about one completed check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    /// The monitor as persisted after this check.
    pub monitor: Monitor,
    pub probe: ProbeResult,
    pub previous_status: MonitorStatus,
    pub transition: Option<Transition>,
    pub performance_issue: bool,
}

/// Receives every persisted check. Implementations absorb their own failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn on_check(&self, outcome: &CheckOutcome);
}

/// Persists probe results and derives transitions from them.
pub struct StatusUpdater {
    monitors: Arc<dyn MonitorStore>,
    history: Arc<dyn HistoryStore>,
    sink: Arc<dyn AlertSink>,
}

impl StatusUpdater {
    pub fn new(
        monitors: Arc<dyn MonitorStore>,
        history: Arc<dyn HistoryStore>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            monitors,
            history,
            sink,
        }
    }

    /// Appends history, updates the monitor, then hands the outcome to the sink.
    /// The sink is not called when persistence fails.
    pub async fn apply(
        &self,
        monitor: Monitor,
        probe: ProbeResult,
    ) -> Result<CheckOutcome, StoreError> {
        self.history.append(&probe).await?;

        let previous_status = monitor.status;
        let new_status = MonitorStatus::from(probe.status);

        let mut updated = monitor;
        updated.status = new_status;
        updated.last_checked = Some(probe.timestamp);
        updated.last_latency_ms = Some(probe.latency_ms);
        updated.uptime = Some(next_uptime(updated.uptime, probe.status));
        let updated = self.monitors.save(updated).await?;

        let performance_issue = probe.status == ProbeStatus::Up
            && probe.latency_ms > updated.expected_latency_ms
            && updated.notifications.on_performance_issue;

        let outcome = CheckOutcome {
            transition: Transition::detect(previous_status, new_status),
            monitor: updated,
            probe,
            previous_status,
            performance_issue,
        };
        debug!(
            monitor_id = outcome.monitor.id,
            previous = %previous_status,
            current = %new_status,
            transition = outcome.transition.is_some(),
            performance_issue,
            "Recorded check."
        );

        self.sink.on_check(&outcome).await;
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::enums::ErrorKind;
    use crate::db::memory::MemoryStore;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct CollectingSink {
        pub outcomes: Mutex<Vec<CheckOutcome>>,
    }

    #[async_trait]
    impl AlertSink for CollectingSink {
        async fn on_check(&self, outcome: &CheckOutcome) {
            self.outcomes.lock().unwrap().push(outcome.clone());
        }
    }

    pub(crate) fn probe(monitor_id: i64, status: ProbeStatus, latency_ms: u64) -> ProbeResult {
        ProbeResult {
            monitor_id,
            status,
            status_code: if status == ProbeStatus::Up { 200 } else { 503 },
            latency_ms,
            message: String::new(),
            timestamp: Utc::now(),
            request_size: 0,
            response_size: 0,
            error_kind: if status == ProbeStatus::Up {
                ErrorKind::None
            } else {
                ErrorKind::Server
            },
        }
    }

    #[test]
    fn test_uptime_ema_sequence() {
        let first = next_uptime(None, ProbeStatus::Up);
        assert_eq!(first, 100.0);
        let second = next_uptime(Some(first), ProbeStatus::Down);
        assert!((second - 90.0).abs() < 1e-9);
        let third = next_uptime(Some(second), ProbeStatus::Down);
        assert!((third - 81.0).abs() < 1e-9);
        assert_eq!(next_uptime(None, ProbeStatus::Down), 0.0);
    }

    #[test]
    fn test_transition_excludes_unknown_baseline() {
        assert_eq!(Transition::detect(MonitorStatus::Unknown, MonitorStatus::Down), None);
        assert_eq!(Transition::detect(MonitorStatus::Down, MonitorStatus::Down), None);
        assert_eq!(
            Transition::detect(MonitorStatus::Down, MonitorStatus::Up),
            Some(Transition {
                from: MonitorStatus::Down,
                to: MonitorStatus::Up
            })
        );
    }

    #[tokio::test]
    async fn test_apply_persists_and_reports() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::default());
        let updater = StatusUpdater::new(store.clone(), store.clone(), sink.clone());
        let monitor = store
            .save(Monitor::new(1, "api", "http://localhost").with_expected_latency_ms(100))
            .await
            .unwrap();

        let outcome = updater
            .apply(monitor, probe(1, ProbeStatus::Up, 250))
            .await
            .unwrap();

        assert_eq!(outcome.monitor.status, MonitorStatus::Up);
        assert_eq!(outcome.monitor.uptime, Some(100.0));
        assert_eq!(outcome.monitor.last_latency_ms, Some(250));
        assert!(outcome.transition.is_none());
        assert!(outcome.performance_issue);

        let stored = MonitorStore::find_by_id(store.as_ref(), 1).await.unwrap().unwrap();
        assert_eq!(stored.status, MonitorStatus::Up);
        assert_eq!(store.history_for(1).await.len(), 1);
        assert_eq!(sink.outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_performance_condition_respects_toggle() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(CollectingSink::default());
        let updater = StatusUpdater::new(store.clone(), store.clone(), sink);
        let mut monitor = Monitor::new(1, "api", "http://localhost").with_expected_latency_ms(100);
        monitor.notifications.on_performance_issue = false;
        let monitor = store.save(monitor).await.unwrap();

        let outcome = updater
            .apply(monitor, probe(1, ProbeStatus::Up, 250))
            .await
            .unwrap();
        assert!(!outcome.performance_issue);
    }
}
