use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use super::models::{Alert, AlertCounts, Monitor, NewAlert, Owner, ProbeResult, UserId};
use super::store::{AlertFilter, AlertStore, HistoryStore, MonitorStore, StoreError, UserDirectory};

/// Process-local stores used when no database is configured, and by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    monitors: DashMap<i64, Monitor>,
    history: RwLock<Vec<ProbeResult>>,
    alerts: DashMap<i64, Alert>,
    owners: DashMap<UserId, Owner>,
    next_monitor_id: AtomicI64,
    next_alert_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_owner(&self, owner: Owner) {
        self.owners.insert(owner.id, owner);
    }

    /// Full probe history of one monitor, oldest first.
    pub async fn history_for(&self, monitor_id: i64) -> Vec<ProbeResult> {
        self.history
            .read()
            .await
            .iter()
            .filter(|p| p.monitor_id == monitor_id)
            .cloned()
            .collect()
    }

    pub fn alerts_for(&self, owner: UserId) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| entry.owner_id == owner)
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        let mut due: Vec<Monitor> = self
            .monitors
            .iter()
            .filter(|entry| entry.is_due(now))
            .map(|entry| entry.value().clone())
            .collect();
        due.sort_by_key(|m| m.id);
        Ok(due)
    }

    async fn save(&self, mut monitor: Monitor) -> Result<Monitor, StoreError> {
        if monitor.id == 0 {
            monitor.id = self.next_monitor_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        self.monitors.insert(monitor.id, monitor.clone());
        Ok(monitor)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>, StoreError> {
        Ok(self.monitors.get(&id).map(|m| m.value().clone()))
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, probe: &ProbeResult) -> Result<(), StoreError> {
        self.history.write().await.push(probe.clone());
        Ok(())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn create(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let id = self.next_alert_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = Alert {
            id,
            owner_id: alert.owner_id,
            monitor_id: alert.monitor_id,
            alert_type: alert.alert_type,
            severity: alert.severity,
            message: alert.message,
            read: false,
            resolved: false,
            resolved_at: None,
            details: alert.details,
            created_at: Utc::now(),
        };
        self.alerts.insert(id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Alert>, StoreError> {
        Ok(self.alerts.get(&id).map(|a| a.value().clone()))
    }

    async fn find_many_by_owner(
        &self,
        owner: UserId,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|entry| entry.owner_id == owner && filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        alerts.truncate(filter.effective_limit() as usize);
        Ok(alerts)
    }

    async fn update_read_flag(&self, id: i64, read: bool) -> Result<Alert, StoreError> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        entry.read = read;
        Ok(entry.value().clone())
    }

    async fn update_resolved_flag(
        &self,
        id: i64,
        resolved: bool,
        at: Option<DateTime<Utc>>,
    ) -> Result<Alert, StoreError> {
        let mut entry = self
            .alerts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("alert {id}")))?;
        entry.resolved = resolved;
        entry.resolved_at = at;
        Ok(entry.value().clone())
    }

    async fn bulk_mark_read(&self, owner: UserId) -> Result<u64, StoreError> {
        let mut modified = 0;
        for mut entry in self.alerts.iter_mut() {
            if entry.owner_id == owner && !entry.read {
                entry.read = true;
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        let mut deleted = 0;
        self.alerts.retain(|_, alert| {
            let keep = alert.owner_id != owner;
            if !keep {
                deleted += 1;
            }
            keep
        });
        Ok(deleted)
    }

    async fn count_unread(&self, owner: UserId) -> Result<u64, StoreError> {
        Ok(self
            .alerts
            .iter()
            .filter(|entry| entry.owner_id == owner && !entry.read)
            .count() as u64)
    }

    async fn count_by_resolved(&self, owner: UserId) -> Result<AlertCounts, StoreError> {
        let mut counts = AlertCounts::default();
        for entry in self.alerts.iter().filter(|e| e.owner_id == owner) {
            if entry.resolved {
                counts.resolved += 1;
            } else {
                counts.unresolved += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Owner>, StoreError> {
        Ok(self.owners.get(&id).map(|o| o.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{AlertType, Severity};
    use serde_json::json;

    fn new_alert(owner: i64, severity: Severity) -> NewAlert {
        NewAlert {
            owner_id: UserId(owner),
            monitor_id: 1,
            alert_type: AlertType::Downtime,
            severity,
            message: "down".to_string(),
            details: json!({}),
        }
    }

    #[tokio::test]
    async fn test_bulk_mark_read_is_owner_scoped() {
        let store = MemoryStore::new();
        store.create(new_alert(1, Severity::Critical)).await.unwrap();
        store.create(new_alert(1, Severity::Info)).await.unwrap();
        store.create(new_alert(2, Severity::Critical)).await.unwrap();

        assert_eq!(store.bulk_mark_read(UserId(1)).await.unwrap(), 2);
        assert_eq!(store.bulk_mark_read(UserId(1)).await.unwrap(), 0);
        assert_eq!(store.count_unread(UserId(1)).await.unwrap(), 0);
        assert_eq!(store.count_unread(UserId(2)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_many_applies_filter_and_limit() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.create(new_alert(1, Severity::Critical)).await.unwrap();
        }
        store.create(new_alert(1, Severity::Info)).await.unwrap();

        let filter = AlertFilter {
            severity: Some(Severity::Critical),
            limit: Some(2),
            ..Default::default()
        };
        let alerts = store.find_many_by_owner(UserId(1), &filter).await.unwrap();
        assert_eq!(alerts.len(), 2);
        assert!(alerts.iter().all(|a| a.severity == Severity::Critical));
        assert!(alerts[0].id > alerts[1].id);
    }

    #[tokio::test]
    async fn test_save_assigns_ids() {
        let store = MemoryStore::new();
        let a = store.save(Monitor::new(1, "a", "http://a")).await.unwrap();
        let b = store.save(Monitor::new(1, "b", "http://b")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(MonitorStore::find_by_id(&store, 2).await.unwrap().unwrap().name, "b");
    }
}
