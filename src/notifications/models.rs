use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tera::{Context, Tera};

use crate::db::enums::{MonitorStatus, ProbeStatus};
use crate::db::models::{Monitor, MonitorSummary, ProbeResult};

use super::senders::SenderError;

/// Resolved delivery target for one channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Email { address: String },
    Sms { phone_number: String },
    Webhook { url: String },
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelConfig::Email { .. } => ChannelKind::Email,
            ChannelConfig::Sms { .. } => ChannelKind::Sms,
            ChannelConfig::Webhook { .. } => ChannelKind::Webhook,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Email,
    Sms,
    Webhook,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Email => "email",
            ChannelKind::Sms => "sms",
            ChannelKind::Webhook => "webhook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    StatusChange { previous: MonitorStatus },
    PerformanceIssue,
}

const STATUS_CHANGE_EMAIL: &str = r#"
<h2>API Status Change</h2>
<p>Your API <strong>{{ name }}</strong> status has changed from <strong>{{ previous }}</strong> to <strong>{{ current }}</strong>.</p>
<p><strong>URL:</strong> {{ url }}</p>
<p><strong>Status Code:</strong> {{ status_code }}</p>
<p><strong>Response Time:</strong> {{ latency_ms }}ms</p>
<p><strong>Message:</strong> {{ message }}</p>
<p><strong>Time:</strong> {{ time }}</p>
"#;

const PERFORMANCE_EMAIL: &str = r#"
<h2>API Performance Issue</h2>
<p>Your API <strong>{{ name }}</strong> is responding slower than expected.</p>
<p><strong>URL:</strong> {{ url }}</p>
<p><strong>Status:</strong> {{ current }}</p>
<p><strong>Response Time:</strong> {{ latency_ms }}ms (Expected: {{ expected_latency_ms }}ms)</p>
<p><strong>Time:</strong> {{ time }}</p>
"#;

/// Everything a sender needs to describe one alert-worthy event.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub monitor: MonitorSummary,
    pub expected_latency_ms: u64,
    pub status: ProbeStatus,
    pub status_code: u16,
    pub latency_ms: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn status_change(monitor: &Monitor, previous: MonitorStatus, probe: &ProbeResult) -> Self {
        Self::build(NotificationKind::StatusChange { previous }, monitor, probe)
    }

    pub fn performance_issue(monitor: &Monitor, probe: &ProbeResult) -> Self {
        Self::build(NotificationKind::PerformanceIssue, monitor, probe)
    }

    fn build(kind: NotificationKind, monitor: &Monitor, probe: &ProbeResult) -> Self {
        Self {
            kind,
            monitor: monitor.summary(),
            expected_latency_ms: monitor.expected_latency_ms,
            status: probe.status,
            status_code: probe.status_code,
            latency_ms: probe.latency_ms,
            message: probe.message.clone(),
            timestamp: probe.timestamp,
        }
    }

    fn upper_status(&self) -> String {
        self.status.as_str().to_uppercase()
    }

    fn display_time(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    pub fn email_subject(&self) -> String {
        match self.kind {
            NotificationKind::StatusChange { .. } => {
                format!("[API Watcher] {} is {}", self.monitor.name, self.upper_status())
            }
            NotificationKind::PerformanceIssue => {
                format!("[API Watcher] {} - Performance Issue Detected", self.monitor.name)
            }
        }
    }

    pub fn email_html(&self) -> Result<String, SenderError> {
        let mut context = Context::new();
        context.insert("name", &self.monitor.name);
        context.insert("url", &self.monitor.url);
        context.insert("current", &self.upper_status());
        context.insert("status_code", &self.status_code);
        context.insert("latency_ms", &self.latency_ms);
        context.insert("expected_latency_ms", &self.expected_latency_ms);
        context.insert("message", &self.message);
        context.insert("time", &self.display_time());

        let template = match &self.kind {
            NotificationKind::StatusChange { previous } => {
                context.insert("previous", &previous.as_str().to_uppercase());
                STATUS_CHANGE_EMAIL
            }
            NotificationKind::PerformanceIssue => PERFORMANCE_EMAIL,
        };

        Tera::one_off(template, &context, true)
            .map_err(|e| SenderError::TemplatingError(e.to_string()))
    }

    pub fn sms_text(&self) -> String {
        match self.kind {
            NotificationKind::StatusChange { .. } => format!(
                "API Watcher: {} is {}. Status code: {}. Time: {}",
                self.monitor.name,
                self.upper_status(),
                self.status_code,
                self.display_time()
            ),
            NotificationKind::PerformanceIssue => format!(
                "API Watcher: {} performance issue. Response time: {}ms (Expected: {}ms). Time: {}",
                self.monitor.name,
                self.latency_ms,
                self.expected_latency_ms,
                self.display_time()
            ),
        }
    }

    pub fn webhook_payload(&self) -> serde_json::Value {
        let api = json!({
            "id": self.monitor.id,
            "name": self.monitor.name,
            "url": self.monitor.url,
        });
        match &self.kind {
            NotificationKind::StatusChange { previous } => json!({
                "event": "status_change",
                "api": api,
                "previousStatus": previous,
                "currentStatus": self.status,
                "statusCode": self.status_code,
                "responseTime": self.latency_ms,
                "message": self.message,
                "timestamp": self.timestamp,
            }),
            NotificationKind::PerformanceIssue => json!({
                "event": "performance_issue",
                "api": api,
                "status": self.status,
                "responseTime": self.latency_ms,
                "expectedResponseTime": self.expected_latency_ms,
                "timestamp": self.timestamp,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::ErrorKind;

    fn sample(kind_previous: Option<MonitorStatus>) -> Notification {
        let mut monitor = Monitor::new(1, "Billing <API>", "https://billing.example.com/health");
        monitor.id = 12;
        let probe = ProbeResult {
            monitor_id: 12,
            status: ProbeStatus::Down,
            status_code: 503,
            latency_ms: 87,
            message: "API returned unexpected status code: 503".to_string(),
            timestamp: Utc::now(),
            request_size: 0,
            response_size: 10,
            error_kind: ErrorKind::Server,
        };
        match kind_previous {
            Some(previous) => Notification::status_change(&monitor, previous, &probe),
            None => Notification::performance_issue(&monitor, &probe),
        }
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            sample(Some(MonitorStatus::Up)).email_subject(),
            "[API Watcher] Billing <API> is DOWN"
        );
        assert_eq!(
            sample(None).email_subject(),
            "[API Watcher] Billing <API> - Performance Issue Detected"
        );
    }

    #[test]
    fn test_email_html_escapes_monitor_name() {
        let html = sample(Some(MonitorStatus::Up)).email_html().unwrap();
        assert!(html.contains("Billing &lt;API&gt;"));
        assert!(html.contains("from <strong>UP</strong> to <strong>DOWN</strong>"));
        assert!(html.contains("503"));
    }

    #[test]
    fn test_webhook_payload_event_names() {
        let change = sample(Some(MonitorStatus::Up)).webhook_payload();
        assert_eq!(change["event"], "status_change");
        assert_eq!(change["previousStatus"], "up");
        assert_eq!(change["currentStatus"], "down");
        assert_eq!(change["api"]["id"], 12);

        let perf = sample(None).webhook_payload();
        assert_eq!(perf["event"], "performance_issue");
        assert_eq!(perf["expectedResponseTime"], 1000);
    }

    #[test]
    fn test_sms_text() {
        assert!(sample(Some(MonitorStatus::Up))
            .sms_text()
            .starts_with("API Watcher: Billing <API> is DOWN. Status code: 503."));
    }
}
