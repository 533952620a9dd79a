use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use super::enums::{AlertType, Severity, UnknownVariant};
use super::models::{Alert, AlertCounts, Monitor, NewAlert, Owner, ProbeResult, UserId};

pub const DEFAULT_ALERT_LIST_LIMIT: u32 = 100;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Corrupt row: {0}")]
    Corrupt(#[from] UnknownVariant),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Optional narrowing of an owner's alert list.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
    pub alert_type: Option<AlertType>,
    pub monitor: Option<i64>,
    pub limit: Option<u32>,
}

impl AlertFilter {
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_ALERT_LIST_LIMIT)
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.resolved.is_none_or(|r| alert.resolved == r)
            && self.severity.is_none_or(|s| alert.severity == s)
            && self.alert_type.is_none_or(|t| alert.alert_type == t)
            && self.monitor.is_none_or(|m| alert.monitor_id == m)
    }
}

#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Monitors never checked, or whose interval has elapsed at `now`.
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError>;
    /// Inserts when `id == 0`, otherwise overwrites. Returns the stored record.
    async fn save(&self, monitor: Monitor) -> Result<Monitor, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>, StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, probe: &ProbeResult) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn create(&self, alert: NewAlert) -> Result<Alert, StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Alert>, StoreError>;
    /// Newest first, capped at the filter's limit.
    async fn find_many_by_owner(
        &self,
        owner: UserId,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, StoreError>;
    async fn update_read_flag(&self, id: i64, read: bool) -> Result<Alert, StoreError>;
    async fn update_resolved_flag(
        &self,
        id: i64,
        resolved: bool,
        at: Option<DateTime<Utc>>,
    ) -> Result<Alert, StoreError>;
    /// Marks every unread alert of `owner` read; returns how many changed.
    async fn bulk_mark_read(&self, owner: UserId) -> Result<u64, StoreError>;
    async fn delete_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError>;
    async fn count_unread(&self, owner: UserId) -> Result<u64, StoreError>;
    async fn count_by_resolved(&self, owner: UserId) -> Result<AlertCounts, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Owner>, StoreError>;
}
