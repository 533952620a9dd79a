use serde_json::json;

use crate::db::enums::{AlertType, MonitorStatus, Severity};
use crate::monitoring::status_updater::CheckOutcome;
use crate::notifications::models::Notification;

/// An alert the engine intends to create for one check.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
    pub notification: Notification,
    /// Whether the monitor's toggle for this event allows notifying the owner.
    pub notify: bool,
}

/// Maps a check outcome to zero or more alert drafts:
///
/// - up → down: `Downtime` / `Critical`
/// - down → up: `Other` / `Info` (recovery)
/// - performance condition: `HighLatency` / `Medium`
pub fn evaluate(outcome: &CheckOutcome) -> Vec<AlertDraft> {
    let monitor = &outcome.monitor;
    let probe = &outcome.probe;
    let toggles = &monitor.notifications;
    let mut drafts = Vec::new();

    if let Some(transition) = outcome.transition {
        let details = json!({
            "previousStatus": transition.from,
            "currentStatus": transition.to,
            "statusCode": probe.status_code,
            "latencyMs": probe.latency_ms,
            "errorKind": probe.error_kind,
            "message": probe.message,
        });
        let notification = Notification::status_change(monitor, transition.from, probe);

        match (transition.from, transition.to) {
            (MonitorStatus::Up, MonitorStatus::Down) => drafts.push(AlertDraft {
                alert_type: AlertType::Downtime,
                severity: Severity::Critical,
                message: format!("{} is down: {}", monitor.name, probe.message),
                details,
                notification,
                notify: toggles.on_down,
            }),
            (MonitorStatus::Down, MonitorStatus::Up) => drafts.push(AlertDraft {
                alert_type: AlertType::Other,
                severity: Severity::Info,
                message: format!("{} has recovered and is up again", monitor.name),
                details,
                notification,
                notify: toggles.on_up,
            }),
            _ => {}
        }
    }

    if outcome.performance_issue {
        drafts.push(AlertDraft {
            alert_type: AlertType::HighLatency,
            severity: Severity::Medium,
            message: format!(
                "{} responded in {}ms, above the expected {}ms",
                monitor.name, probe.latency_ms, monitor.expected_latency_ms
            ),
            details: json!({
                "latencyMs": probe.latency_ms,
                "expectedLatencyMs": monitor.expected_latency_ms,
                "statusCode": probe.status_code,
            }),
            notification: Notification::performance_issue(monitor, probe),
            notify: toggles.on_performance_issue,
        });
    }

    drafts
}
