use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::enums::MonitorStatus;
use crate::db::models::{AlertView, UserId};

/// Payload of the global `statusChange` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub monitor_id: i64,
    pub name: String,
    pub old_status: MonitorStatus,
    pub new_status: MonitorStatus,
    pub timestamp: DateTime<Utc>,
}

/// Every event a live client can receive. Serialized as
/// `{"event": "<name>", "payload": <data>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum RealtimeEvent {
    NewAlert(AlertView),
    #[serde(rename_all = "camelCase")]
    AlertRead { alert_id: i64 },
    #[serde(rename_all = "camelCase")]
    MarkAllRead { modified_count: u64 },
    #[serde(rename_all = "camelCase")]
    AlertResolved { alert_id: i64, monitor_id: i64 },
    #[serde(rename_all = "camelCase")]
    ClearAllAlerts { deleted_count: u64 },
    /// Tells the client to refetch its unread badge.
    RefreshUnreadCount,
    GlobalAlert(AlertView),
    StatusChange(StatusChange),
    /// Direct acknowledgement of a join request.
    #[serde(rename_all = "camelCase")]
    Joined { user_id: UserId },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::NewAlert(_) => "newAlert",
            RealtimeEvent::AlertRead { .. } => "alertRead",
            RealtimeEvent::MarkAllRead { .. } => "markAllRead",
            RealtimeEvent::AlertResolved { .. } => "alertResolved",
            RealtimeEvent::ClearAllAlerts { .. } => "clearAllAlerts",
            RealtimeEvent::RefreshUnreadCount => "refreshUnreadCount",
            RealtimeEvent::GlobalAlert(_) => "globalAlert",
            RealtimeEvent::StatusChange(_) => "statusChange",
            RealtimeEvent::Joined { .. } => "joined",
        }
    }
}
