use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::rules::{AlertDraft, evaluate};
use crate::db::enums::AlertType;
use crate::db::models::{Alert, AlertCounts, AlertView, Monitor, NewAlert, Owner, UserId};
use crate::db::store::{AlertFilter, AlertStore, StoreError, UserDirectory};
use crate::monitoring::status_updater::{AlertSink, CheckOutcome};
use crate::notifications::service::NotificationService;
use crate::realtime::events::{RealtimeEvent, StatusChange};
use crate::realtime::publisher::RealtimePublisher;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alert {0} not found")]
    NotFound(i64),
    #[error("Not authorized to access alert {0}")]
    NotAuthorized(i64),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Creates alerts from check outcomes and owns the read/resolve lifecycle.
pub struct AlertService {
    alerts: Arc<dyn AlertStore>,
    users: Arc<dyn UserDirectory>,
    publisher: RealtimePublisher,
    notifications: Arc<NotificationService>,
    latency_cooldown: ChronoDuration,
    last_latency_alert: DashMap<i64, DateTime<Utc>>,
}

impl AlertService {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        users: Arc<dyn UserDirectory>,
        publisher: RealtimePublisher,
        notifications: Arc<NotificationService>,
        latency_cooldown_secs: u64,
    ) -> Self {
        Self {
            alerts,
            users,
            publisher,
            notifications,
            latency_cooldown: i64::try_from(latency_cooldown_secs)
                .ok()
                .and_then(ChronoDuration::try_seconds)
                .unwrap_or(ChronoDuration::MAX),
            last_latency_alert: DashMap::new(),
        }
    }

    /// True if no latency alert was stored for this monitor within the cooldown.
    fn latency_slot_open(&self, monitor_id: i64, at: DateTime<Utc>) -> bool {
        if self.latency_cooldown <= ChronoDuration::zero() {
            return true;
        }
        self.last_latency_alert
            .get(&monitor_id)
            .is_none_or(|last| at.signed_duration_since(*last) >= self.latency_cooldown)
    }

    fn record_latency_alert(&self, monitor_id: i64, at: DateTime<Utc>) {
        self.last_latency_alert.insert(monitor_id, at);
    }

    async fn create_alert(
        &self,
        owner: &Owner,
        monitor: &Monitor,
        draft: AlertDraft,
        at: DateTime<Utc>,
    ) {
        let new_alert = NewAlert {
            owner_id: owner.id,
            monitor_id: monitor.id,
            alert_type: draft.alert_type,
            severity: draft.severity,
            message: draft.message,
            details: draft.details,
        };
        let alert = match self.alerts.create(new_alert).await {
            Ok(alert) => alert,
            Err(e) => {
                error!(monitor_id = monitor.id, alert_type = %draft.alert_type, error = %e, "Failed to persist alert.");
                return;
            }
        };
        if alert.alert_type == AlertType::HighLatency {
            self.record_latency_alert(monitor.id, at);
        }
        info!(
            alert_id = alert.id,
            monitor_id = monitor.id,
            user_id = %owner.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "Alert created."
        );

        let view = AlertView {
            alert,
            monitor: Some(monitor.summary()),
            owner: Some(owner.summary()),
        };
        if !self.publisher.emit_new_alert(&view) {
            warn!(
                alert_id = view.alert.id,
                "New alert was not delivered to every live connection."
            );
        }
        self.publisher.emit_global(&RealtimeEvent::GlobalAlert(view));

        if draft.notify {
            self.notifications.dispatch(owner, &draft.notification).await;
        } else {
            debug!(monitor_id = monitor.id, alert_type = %draft.alert_type, "Notifications disabled for this event.");
        }
    }

    async fn owned_alert(&self, owner: UserId, alert_id: i64) -> Result<Alert, AlertError> {
        let alert = self
            .alerts
            .find_by_id(alert_id)
            .await?
            .ok_or(AlertError::NotFound(alert_id))?;
        if alert.owner_id != owner {
            return Err(AlertError::NotAuthorized(alert_id));
        }
        Ok(alert)
    }

    pub async fn get(&self, owner: impl Into<UserId>, alert_id: i64) -> Result<Alert, AlertError> {
        self.owned_alert(owner.into(), alert_id).await
    }

    pub async fn list(
        &self,
        owner: impl Into<UserId>,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, AlertError> {
        Ok(self.alerts.find_many_by_owner(owner.into(), filter).await?)
    }

    pub async fn counts(&self, owner: impl Into<UserId>) -> Result<AlertCounts, AlertError> {
        Ok(self.alerts.count_by_resolved(owner.into()).await?)
    }

    pub async fn unread_count(&self, owner: impl Into<UserId>) -> Result<u64, AlertError> {
        Ok(self.alerts.count_unread(owner.into()).await?)
    }

    /// Idempotent. Emits `alertRead` and `refreshUnreadCount` to the owner.
    pub async fn mark_as_read(
        &self,
        owner: impl Into<UserId>,
        alert_id: i64,
    ) -> Result<Alert, AlertError> {
        let alert = self.owned_alert(owner.into(), alert_id).await?;
        let alert = if alert.read {
            alert
        } else {
            self.alerts.update_read_flag(alert_id, true).await?
        };
        self.publisher.emit_alert_read(&alert);
        Ok(alert)
    }

    /// Idempotent; the first resolution time is kept.
    pub async fn resolve(
        &self,
        owner: impl Into<UserId>,
        alert_id: i64,
    ) -> Result<Alert, AlertError> {
        let alert = self.owned_alert(owner.into(), alert_id).await?;
        let alert = if alert.resolved {
            alert
        } else {
            self.alerts
                .update_resolved_flag(alert_id, true, Some(Utc::now()))
                .await?
        };
        self.publisher.emit_resolved(&alert);
        Ok(alert)
    }

    pub async fn mark_all_read(&self, owner: impl Into<UserId>) -> Result<u64, AlertError> {
        let owner = owner.into();
        let modified = self.alerts.bulk_mark_read(owner).await?;
        info!(user_id = %owner, modified, "Marked all alerts read.");
        self.publisher.emit_mark_all_read(owner, modified);
        Ok(modified)
    }

    pub async fn clear_all(&self, owner: impl Into<UserId>) -> Result<u64, AlertError> {
        let owner = owner.into();
        let deleted = self.alerts.delete_all_by_owner(owner).await?;
        info!(user_id = %owner, deleted, "Cleared all alerts.");
        self.publisher.emit_cleared(owner, deleted);
        Ok(deleted)
    }
}

#[async_trait]
impl AlertSink for AlertService {
    async fn on_check(&self, outcome: &CheckOutcome) {
        let monitor = &outcome.monitor;

        if let Some(transition) = outcome.transition {
            info!(
                monitor_id = monitor.id,
                from = %transition.from,
                to = %transition.to,
                "Monitor status changed."
            );
            self.publisher.emit_global(&RealtimeEvent::StatusChange(StatusChange {
                monitor_id: monitor.id,
                name: monitor.name.clone(),
                old_status: transition.from,
                new_status: transition.to,
                timestamp: outcome.probe.timestamp,
            }));
        }

        let mut drafts: Vec<AlertDraft> = Vec::new();
        for draft in evaluate(outcome) {
            if draft.alert_type == AlertType::HighLatency
                && !self.latency_slot_open(monitor.id, outcome.probe.timestamp)
            {
                debug!(monitor_id = monitor.id, "Latency alert suppressed by cooldown.");
                continue;
            }
            drafts.push(draft);
        }
        if drafts.is_empty() {
            return;
        }

        let owner = match self.users.find_by_id(monitor.owner_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                warn!(monitor_id = monitor.id, user_id = %monitor.owner_id, "Monitor owner not found, skipping alert.");
                return;
            }
            Err(e) => {
                error!(monitor_id = monitor.id, error = %e, "Failed to load monitor owner, skipping alert.");
                return;
            }
        };

        for draft in drafts {
            self.create_alert(&owner, monitor, draft, outcome.probe.timestamp)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::{MonitorStatus, ProbeStatus, Severity};
    use crate::db::memory::MemoryStore;
    use crate::db::store::MonitorStore;
    use crate::monitoring::status_updater::StatusUpdater;
    use crate::monitoring::status_updater::tests::probe;
    use crate::notifications::service::tests::{RecordingSender, owner_with_all_channels};
    use crate::realtime::room_hub::{Connection, RoomHub};
    use serde_json::Value;

    struct Harness {
        store: Arc<MemoryStore>,
        hub: Arc<RoomHub>,
        service: Arc<AlertService>,
        updater: StatusUpdater,
        email: Arc<RecordingSender>,
        webhook: Arc<RecordingSender>,
    }

    fn harness(cooldown_secs: u64) -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.insert_owner(owner_with_all_channels(1));
        store.insert_owner(owner_with_all_channels(2));
        let hub = Arc::new(RoomHub::new());
        let email = Arc::new(RecordingSender::default());
        let webhook = Arc::new(RecordingSender::default());
        let notifications = Arc::new(NotificationService::new(
            email.clone(),
            Arc::new(RecordingSender::default()),
            webhook.clone(),
        ));
        let service = Arc::new(AlertService::new(
            store.clone(),
            store.clone(),
            RealtimePublisher::new(hub.clone()),
            notifications,
            cooldown_secs,
        ));
        let updater = StatusUpdater::new(store.clone(), store.clone(), service.clone());
        Harness {
            store,
            hub,
            service,
            updater,
            email,
            webhook,
        }
    }

    fn events(conn: &mut Connection) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(frame) = conn.room_rx.try_recv() {
            let value: Value = serde_json::from_str(&frame).unwrap();
            names.push(value["event"].as_str().unwrap().to_string());
        }
        names
    }

    fn global_events(conn: &mut Connection) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(frame) = conn.global_rx.try_recv() {
            let value: Value = serde_json::from_str(&frame).unwrap();
            names.push(value["event"].as_str().unwrap().to_string());
        }
        names
    }

    impl Harness {
        async fn monitor(&self, owner: i64) -> Monitor {
            self.store
                .save(Monitor::new(owner, "orders", "http://orders.internal"))
                .await
                .unwrap()
        }

        async fn check(&self, monitor_id: i64, status: ProbeStatus, latency_ms: u64) {
            let monitor = MonitorStore::find_by_id(self.store.as_ref(), monitor_id)
                .await
                .unwrap()
                .unwrap();
            self.updater
                .apply(monitor, probe(monitor_id, status, latency_ms))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_up_to_down_creates_one_critical_downtime_alert() {
        let h = harness(900);
        let mut conn = h.hub.connect();
        h.hub.join(conn.id, UserId(1));
        let monitor = h.monitor(1).await;

        h.check(monitor.id, ProbeStatus::Up, 10).await;
        h.check(monitor.id, ProbeStatus::Down, 10).await;

        let alerts = h.store.alerts_for(UserId(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Downtime);
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(h.email.count(), 1);
        assert_eq!(h.webhook.count(), 1);
        assert_eq!(events(&mut conn), vec!["newAlert", "refreshUnreadCount"]);
        assert_eq!(global_events(&mut conn), vec!["statusChange", "globalAlert"]);
    }

    #[tokio::test]
    async fn test_unknown_down_down_up_yields_single_recovery() {
        let h = harness(900);
        let monitor = h.monitor(1).await;

        h.check(monitor.id, ProbeStatus::Down, 10).await;
        assert!(h.store.alerts_for(UserId(1)).is_empty());
        h.check(monitor.id, ProbeStatus::Down, 10).await;
        assert!(h.store.alerts_for(UserId(1)).is_empty());
        h.check(monitor.id, ProbeStatus::Up, 10).await;

        let alerts = h.store.alerts_for(UserId(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Other);
        assert_eq!(alerts[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_toggle_off_skips_notifications_but_keeps_alert() {
        let h = harness(900);
        let mut monitor = h.monitor(1).await;
        monitor.notifications.on_down = false;
        let monitor = h.store.save(monitor).await.unwrap();

        h.check(monitor.id, ProbeStatus::Up, 10).await;
        h.check(monitor.id, ProbeStatus::Down, 10).await;

        assert_eq!(h.store.alerts_for(UserId(1)).len(), 1);
        assert_eq!(h.email.count(), 0);
    }

    #[tokio::test]
    async fn test_missing_owner_skips_alert_without_error() {
        let h = harness(900);
        let monitor = h.monitor(77).await;

        h.check(monitor.id, ProbeStatus::Up, 10).await;
        h.check(monitor.id, ProbeStatus::Down, 10).await;

        assert!(h.store.alerts_for(UserId(77)).is_empty());
        let stored = MonitorStore::find_by_id(h.store.as_ref(), monitor.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MonitorStatus::Down);
    }

    #[tokio::test]
    async fn test_latency_alerts_respect_cooldown() {
        let h = harness(900);
        let monitor = h.monitor(1).await;
        for _ in 0..3 {
            h.check(monitor.id, ProbeStatus::Up, 5_000).await;
        }
        let latency: Vec<_> = h
            .store
            .alerts_for(UserId(1))
            .into_iter()
            .filter(|a| a.alert_type == AlertType::HighLatency)
            .collect();
        assert_eq!(latency.len(), 1);
        assert_eq!(latency[0].severity, Severity::Medium);

        let h = harness(0);
        let monitor = h.monitor(1).await;
        for _ in 0..3 {
            h.check(monitor.id, ProbeStatus::Up, 5_000).await;
        }
        assert_eq!(h.store.alerts_for(UserId(1)).len(), 3);
    }

    #[tokio::test]
    async fn test_latency_cooldown_starts_only_after_an_alert_is_stored() {
        let h = harness(900);
        let monitor = h.monitor(77).await;

        h.check(monitor.id, ProbeStatus::Up, 5_000).await;
        assert!(h.store.alerts_for(UserId(77)).is_empty());

        h.store.insert_owner(owner_with_all_channels(77));
        h.check(monitor.id, ProbeStatus::Up, 5_000).await;
        let alerts = h.store.alerts_for(UserId(77));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::HighLatency);

        h.check(monitor.id, ProbeStatus::Up, 5_000).await;
        assert_eq!(h.store.alerts_for(UserId(77)).len(), 1);
    }

    #[tokio::test]
    async fn test_mark_all_read_is_scoped_and_refreshes_once() {
        let h = harness(900);
        let a = h.monitor(1).await;
        let b = h.monitor(2).await;
        for id in [a.id, b.id] {
            h.check(id, ProbeStatus::Up, 10).await;
            h.check(id, ProbeStatus::Down, 10).await;
            h.check(id, ProbeStatus::Up, 10).await;
        }
        let mut conn_a = h.hub.connect();
        h.hub.join(conn_a.id, UserId(1));

        assert_eq!(h.service.mark_all_read(1_i64).await.unwrap(), 2);
        assert_eq!(h.service.unread_count(1_i64).await.unwrap(), 0);
        assert_eq!(h.service.unread_count(2_i64).await.unwrap(), 2);

        let received = events(&mut conn_a);
        assert_eq!(received, vec!["markAllRead", "refreshUnreadCount"]);
    }

    #[tokio::test]
    async fn test_clear_all_is_scoped() {
        let h = harness(900);
        let a = h.monitor(1).await;
        let b = h.monitor(2).await;
        for id in [a.id, b.id] {
            h.check(id, ProbeStatus::Up, 10).await;
            h.check(id, ProbeStatus::Down, 10).await;
        }

        assert_eq!(h.service.clear_all(UserId(1)).await.unwrap(), 1);
        assert_eq!(h.service.unread_count(UserId(1)).await.unwrap(), 0);
        assert_eq!(h.store.alerts_for(UserId(2)).len(), 1);
    }

    #[tokio::test]
    async fn test_read_and_resolve_enforce_ownership() {
        let h = harness(900);
        let monitor = h.monitor(1).await;
        h.check(monitor.id, ProbeStatus::Up, 10).await;
        h.check(monitor.id, ProbeStatus::Down, 10).await;
        let alert_id = h.store.alerts_for(UserId(1))[0].id;
        let mut conn = h.hub.connect();
        h.hub.join(conn.id, UserId(1));

        assert!(matches!(
            h.service.mark_as_read(2_i64, alert_id).await,
            Err(AlertError::NotAuthorized(_))
        ));
        assert!(matches!(
            h.service.resolve(1_i64, 9_999).await,
            Err(AlertError::NotFound(9_999))
        ));

        assert!(events(&mut conn).is_empty());

        let read = h.service.mark_as_read(1_i64, alert_id).await.unwrap();
        assert!(read.read);
        assert_eq!(events(&mut conn), vec!["alertRead", "refreshUnreadCount"]);
        let again = h.service.mark_as_read(1_i64, alert_id).await.unwrap();
        assert!(again.read);
        assert_eq!(events(&mut conn), vec!["alertRead", "refreshUnreadCount"]);

        let resolved = h.service.resolve(1_i64, alert_id).await.unwrap();
        assert_eq!(events(&mut conn), vec!["alertResolved", "refreshUnreadCount"]);
        assert!(resolved.resolved);
        let first_resolved_at = resolved.resolved_at;
        assert!(first_resolved_at.is_some());
        let again = h.service.resolve(1_i64, alert_id).await.unwrap();
        assert_eq!(again.resolved_at, first_resolved_at);

        let counts = h.service.counts(1_i64).await.unwrap();
        assert_eq!(counts, AlertCounts { resolved: 1, unresolved: 0 });
    }

    #[tokio::test]
    async fn test_end_to_end_recovery_after_outage() {
        use crate::monitoring::{Prober, Scheduler};
        use axum::{Router, extract::State, http::StatusCode, routing::get};
        use std::sync::atomic::{AtomicU16, Ordering};

        let code = Arc::new(AtomicU16::new(503));
        let app = Router::new()
            .route(
                "/",
                get(|State(code): State<Arc<AtomicU16>>| async move {
                    StatusCode::from_u16(code.load(Ordering::SeqCst)).unwrap()
                }),
            )
            .with_state(code.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let h = harness(900);
        let monitor = h
            .store
            .save(Monitor::new(1, "M", format!("http://{addr}/")).with_interval(1))
            .await
            .unwrap();
        let updater = Arc::new(StatusUpdater::new(
            h.store.clone(),
            h.store.clone(),
            h.service.clone(),
        ));
        let scheduler = Scheduler::new(h.store.clone(), Prober::new().unwrap(), updater, 4);
        let start = Utc::now();

        scheduler.run_sweep(start).await.unwrap();
        assert!(h.store.alerts_for(UserId(1)).is_empty());

        scheduler
            .run_sweep(start + ChronoDuration::minutes(2))
            .await
            .unwrap();
        assert!(h.store.alerts_for(UserId(1)).is_empty());

        code.store(200, Ordering::SeqCst);
        let report = scheduler
            .run_sweep(start + ChronoDuration::minutes(4))
            .await
            .unwrap();
        assert_eq!(report.due, 1);

        let alerts = h.store.alerts_for(UserId(1));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_type, AlertType::Other);
        assert_eq!(alerts[0].severity, Severity::Info);

        let stored = MonitorStore::find_by_id(h.store.as_ref(), monitor.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MonitorStatus::Up);
        let uptime = stored.uptime.unwrap();
        assert!((uptime - 10.0).abs() < 1e-9, "uptime was {uptime}");
        assert_eq!(h.store.history_for(monitor.id).await.len(), 3);
    }
}
