use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::enums::{AlertType, ErrorKind, HttpMethod, MonitorStatus, ProbeStatus, Severity};

pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_EXPECTED_LATENCY_MS: u64 = 1000;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 5;
pub const MIN_INTERVAL_MINUTES: u32 = 1;
pub const MAX_INTERVAL_MINUTES: u32 = 60;

/// Normalized user identity. Raw ids, owners and alert records all convert
/// into this once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Accepts a number, a numeric string, or an object carrying `id`/`_id`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(UserId),
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("_id"))
                .and_then(Self::from_json),
            _ => None,
        }
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i64>().map(UserId)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        UserId(id)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        UserId(i64::from(id))
    }
}

impl From<&Owner> for UserId {
    fn from(owner: &Owner) -> Self {
        owner.id
    }
}

impl From<&Alert> for UserId {
    fn from(alert: &Alert) -> Self {
        alert.owner_id
    }
}

impl From<&AlertView> for UserId {
    fn from(view: &AlertView) -> Self {
        view.alert.owner_id
    }
}

/// Per-event notification switches on a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationToggles {
    pub on_down: bool,
    pub on_up: bool,
    pub on_performance_issue: bool,
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            on_down: true,
            on_up: true,
            on_performance_issue: true,
        }
    }
}

/// An external HTTP target under periodic observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub owner_id: UserId,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub expected_status: u16,
    pub expected_latency_ms: u64,
    pub interval_minutes: u32,
    pub notifications: NotificationToggles,
    pub status: MonitorStatus,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub uptime: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Monitor {
    /// A new monitor with every optional setting at its default. The id is
    /// assigned by the store on first save when left at 0.
    pub fn new(
        owner_id: impl Into<UserId>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            owner_id: owner_id.into(),
            name: name.into(),
            url: url.into(),
            method: HttpMethod::default(),
            headers: HashMap::new(),
            body: None,
            expected_status: DEFAULT_EXPECTED_STATUS,
            expected_latency_ms: DEFAULT_EXPECTED_LATENCY_MS,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            notifications: NotificationToggles::default(),
            status: MonitorStatus::default(),
            last_checked: None,
            last_latency_ms: None,
            uptime: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_interval(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes.clamp(MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES);
        self
    }

    pub fn with_expected_status(mut self, code: u16) -> Self {
        self.expected_status = code;
        self
    }

    pub fn with_expected_latency_ms(mut self, ms: u64) -> Self {
        self.expected_latency_ms = ms;
        self
    }

    pub fn interval(&self) -> ChronoDuration {
        ChronoDuration::minutes(i64::from(self.interval_minutes))
    }

    /// True when the monitor has never been checked or its interval has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_checked {
            None => true,
            Some(last) => now.signed_duration_since(last) >= self.interval(),
        }
    }

    /// Probe timeout: twice the latency budget.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.expected_latency_ms.saturating_mul(2).max(1))
    }

    pub fn summary(&self) -> MonitorSummary {
        MonitorSummary {
            id: self.id,
            name: self.name.clone(),
            url: self.url.clone(),
        }
    }
}

/// Immutable history record for one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub monitor_id: i64,
    pub status: ProbeStatus,
    /// 0 when no response was received.
    pub status_code: u16,
    pub latency_ms: u64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub request_size: u64,
    pub response_size: u64,
    pub error_kind: ErrorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub owner_id: UserId,
    pub monitor_id: i64,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub read: bool,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields the alert engine supplies when creating an alert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub owner_id: UserId,
    pub monitor_id: i64,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub id: i64,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// An alert enriched with its monitor's and owner's display fields, as handed
/// to live clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub monitor: Option<MonitorSummary>,
    pub owner: Option<OwnerSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPreference {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsPreference {
    pub enabled: bool,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPreference {
    pub enabled: bool,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPreferences {
    pub email: EmailPreference,
    pub sms: SmsPreference,
    pub webhook: WebhookPreference,
}

/// Read-only view of a user, as supplied by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub preferences: ChannelPreferences,
}

impl Owner {
    pub fn summary(&self) -> OwnerSummary {
        OwnerSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

/// Resolved/unresolved split of one owner's alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub resolved: u64,
    pub unresolved: u64,
}
