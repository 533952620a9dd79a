use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;

use super::models::{
    Alert, AlertCounts, ChannelPreferences, EmailPreference, Monitor, NewAlert,
    NotificationToggles, Owner, ProbeResult, SmsPreference, UserId, WebhookPreference,
};
use super::store::{AlertFilter, AlertStore, HistoryStore, MonitorStore, StoreError, UserDirectory};

const MONITOR_COLUMNS: &str = "id, owner_id, name, url, method, headers, body, expected_status, \
     expected_latency_ms, interval_minutes, notify_on_down, notify_on_up, notify_on_performance, \
     status, last_checked, last_latency_ms, uptime, created_at";

const ALERT_COLUMNS: &str = "id, owner_id, monitor_id, alert_type, severity, message, read, \
     resolved, resolved_at, details, created_at";

/// Row shape of the `monitors` table.
#[derive(Debug, FromRow)]
struct MonitorRow {
    id: i64,
    owner_id: i64,
    name: String,
    url: String,
    method: String,
    headers: Json<HashMap<String, String>>,
    body: Option<String>,
    expected_status: i32,
    expected_latency_ms: i64,
    interval_minutes: i32,
    notify_on_down: bool,
    notify_on_up: bool,
    notify_on_performance: bool,
    status: String,
    last_checked: Option<DateTime<Utc>>,
    last_latency_ms: Option<i64>,
    uptime: Option<f64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MonitorRow> for Monitor {
    type Error = StoreError;

    fn try_from(row: MonitorRow) -> Result<Self, Self::Error> {
        Ok(Monitor {
            id: row.id,
            owner_id: UserId(row.owner_id),
            name: row.name,
            url: row.url,
            method: row.method.parse()?,
            headers: row.headers.0,
            body: row.body,
            expected_status: u16::try_from(row.expected_status).unwrap_or(200),
            expected_latency_ms: u64::try_from(row.expected_latency_ms).unwrap_or(0),
            interval_minutes: u32::try_from(row.interval_minutes).unwrap_or(1),
            notifications: NotificationToggles {
                on_down: row.notify_on_down,
                on_up: row.notify_on_up,
                on_performance_issue: row.notify_on_performance,
            },
            status: row.status.parse()?,
            last_checked: row.last_checked,
            last_latency_ms: row.last_latency_ms.and_then(|v| u64::try_from(v).ok()),
            uptime: row.uptime,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: i64,
    owner_id: i64,
    monitor_id: i64,
    alert_type: String,
    severity: String,
    message: String,
    read: bool,
    resolved: bool,
    resolved_at: Option<DateTime<Utc>>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        Ok(Alert {
            id: row.id,
            owner_id: UserId(row.owner_id),
            monitor_id: row.monitor_id,
            alert_type: row.alert_type.parse()?,
            severity: row.severity.parse()?,
            message: row.message,
            read: row.read,
            resolved: row.resolved,
            resolved_at: row.resolved_at,
            details: row.details,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    email_enabled: bool,
    sms_enabled: bool,
    sms_phone_number: Option<String>,
    webhook_enabled: bool,
    webhook_url: Option<String>,
}

impl From<UserRow> for Owner {
    fn from(row: UserRow) -> Self {
        Owner {
            id: UserId(row.id),
            name: row.name,
            email: row.email,
            preferences: ChannelPreferences {
                email: EmailPreference {
                    enabled: row.email_enabled,
                },
                sms: SmsPreference {
                    enabled: row.sms_enabled,
                    phone_number: row.sms_phone_number,
                },
                webhook: WebhookPreference {
                    enabled: row.webhook_enabled,
                    url: row.webhook_url,
                },
            },
        }
    }
}

/// sqlx-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_str!("../../migrations/0001_init.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn alert_row_not_found(id: i64) -> impl FnOnce(sqlx::Error) -> StoreError {
        move |e| match e {
            sqlx::Error::RowNotFound => StoreError::NotFound(format!("alert {id}")),
            other => StoreError::Database(other),
        }
    }
}

#[async_trait]
impl MonitorStore for PgStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, StoreError> {
        let sql = format!(
            "SELECT {MONITOR_COLUMNS} FROM monitors \
             WHERE last_checked IS NULL \
                OR last_checked <= $1 - make_interval(mins => interval_minutes) \
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, MonitorRow>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Monitor::try_from).collect()
    }

    async fn save(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let expected_latency = i64::try_from(monitor.expected_latency_ms).unwrap_or(i64::MAX);
        let last_latency = monitor
            .last_latency_ms
            .map(|v| i64::try_from(v).unwrap_or(i64::MAX));

        let row = if monitor.id == 0 {
            let sql = format!(
                "INSERT INTO monitors (owner_id, name, url, method, headers, body, expected_status, \
                 expected_latency_ms, interval_minutes, notify_on_down, notify_on_up, \
                 notify_on_performance, status, last_checked, last_latency_ms, uptime, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
                 RETURNING {MONITOR_COLUMNS}"
            );
            sqlx::query_as::<_, MonitorRow>(&sql)
                .bind(monitor.owner_id.0)
                .bind(&monitor.name)
                .bind(&monitor.url)
                .bind(monitor.method.as_str())
                .bind(Json(&monitor.headers))
                .bind(&monitor.body)
                .bind(i32::from(monitor.expected_status))
                .bind(expected_latency)
                .bind(i32::try_from(monitor.interval_minutes).unwrap_or(i32::MAX))
                .bind(monitor.notifications.on_down)
                .bind(monitor.notifications.on_up)
                .bind(monitor.notifications.on_performance_issue)
                .bind(monitor.status.as_str())
                .bind(monitor.last_checked)
                .bind(last_latency)
                .bind(monitor.uptime)
                .bind(monitor.created_at)
                .fetch_one(&self.pool)
                .await?
        } else {
            let sql = format!(
                "UPDATE monitors SET owner_id = $2, name = $3, url = $4, method = $5, headers = $6, \
                 body = $7, expected_status = $8, expected_latency_ms = $9, interval_minutes = $10, \
                 notify_on_down = $11, notify_on_up = $12, notify_on_performance = $13, status = $14, \
                 last_checked = $15, last_latency_ms = $16, uptime = $17 \
                 WHERE id = $1 RETURNING {MONITOR_COLUMNS}"
            );
            sqlx::query_as::<_, MonitorRow>(&sql)
                .bind(monitor.id)
                .bind(monitor.owner_id.0)
                .bind(&monitor.name)
                .bind(&monitor.url)
                .bind(monitor.method.as_str())
                .bind(Json(&monitor.headers))
                .bind(&monitor.body)
                .bind(i32::from(monitor.expected_status))
                .bind(expected_latency)
                .bind(i32::try_from(monitor.interval_minutes).unwrap_or(i32::MAX))
                .bind(monitor.notifications.on_down)
                .bind(monitor.notifications.on_up)
                .bind(monitor.notifications.on_performance_issue)
                .bind(monitor.status.as_str())
                .bind(monitor.last_checked)
                .bind(last_latency)
                .bind(monitor.uptime)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::RowNotFound => {
                        StoreError::NotFound(format!("monitor {}", monitor.id))
                    }
                    other => StoreError::Database(other),
                })?
        };
        Monitor::try_from(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Monitor>, StoreError> {
        let sql = format!("SELECT {MONITOR_COLUMNS} FROM monitors WHERE id = $1");
        sqlx::query_as::<_, MonitorRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Monitor::try_from)
            .transpose()
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn append(&self, probe: &ProbeResult) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO probe_results (monitor_id, status, status_code, latency_ms, message, \
             timestamp, request_size, response_size, error_kind) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(probe.monitor_id)
        .bind(probe.status.as_str())
        .bind(i32::from(probe.status_code))
        .bind(i64::try_from(probe.latency_ms).unwrap_or(i64::MAX))
        .bind(&probe.message)
        .bind(probe.timestamp)
        .bind(i64::try_from(probe.request_size).unwrap_or(i64::MAX))
        .bind(i64::try_from(probe.response_size).unwrap_or(i64::MAX))
        .bind(probe.error_kind.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn create(&self, alert: NewAlert) -> Result<Alert, StoreError> {
        let sql = format!(
            "INSERT INTO alerts (owner_id, monitor_id, alert_type, severity, message, details) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ALERT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(alert.owner_id.0)
            .bind(alert.monitor_id)
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.message)
            .bind(&alert.details)
            .fetch_one(&self.pool)
            .await?;
        Alert::try_from(row)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Alert>, StoreError> {
        let sql = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1");
        sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Alert::try_from)
            .transpose()
    }

    async fn find_many_by_owner(
        &self,
        owner: UserId,
        filter: &AlertFilter,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE owner_id = "));
        builder.push_bind(owner.0);
        if let Some(resolved) = filter.resolved {
            builder.push(" AND resolved = ").push_bind(resolved);
        }
        if let Some(severity) = filter.severity {
            builder.push(" AND severity = ").push_bind(severity.as_str());
        }
        if let Some(alert_type) = filter.alert_type {
            builder.push(" AND alert_type = ").push_bind(alert_type.as_str());
        }
        if let Some(monitor_id) = filter.monitor {
            builder.push(" AND monitor_id = ").push_bind(monitor_id);
        }
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.effective_limit()));

        let rows = builder
            .build_query_as::<AlertRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Alert::try_from).collect()
    }

    async fn update_read_flag(&self, id: i64, read: bool) -> Result<Alert, StoreError> {
        let sql = format!("UPDATE alerts SET read = $2 WHERE id = $1 RETURNING {ALERT_COLUMNS}");
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .bind(read)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::alert_row_not_found(id))?;
        Alert::try_from(row)
    }

    async fn update_resolved_flag(
        &self,
        id: i64,
        resolved: bool,
        at: Option<DateTime<Utc>>,
    ) -> Result<Alert, StoreError> {
        let sql = format!(
            "UPDATE alerts SET resolved = $2, resolved_at = $3 WHERE id = $1 RETURNING {ALERT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AlertRow>(&sql)
            .bind(id)
            .bind(resolved)
            .bind(at)
            .fetch_one(&self.pool)
            .await
            .map_err(Self::alert_row_not_found(id))?;
        Alert::try_from(row)
    }

    async fn bulk_mark_read(&self, owner: UserId) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE alerts SET read = TRUE WHERE owner_id = $1 AND read = FALSE")
                .bind(owner.0)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all_by_owner(&self, owner: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM alerts WHERE owner_id = $1")
            .bind(owner.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_unread(&self, owner: UserId) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM alerts WHERE owner_id = $1 AND read = FALSE")
                .bind(owner.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn count_by_resolved(&self, owner: UserId) -> Result<AlertCounts, StoreError> {
        let (resolved, unresolved): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE resolved), COUNT(*) FILTER (WHERE NOT resolved) \
             FROM alerts WHERE owner_id = $1",
        )
        .bind(owner.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(AlertCounts {
            resolved: u64::try_from(resolved).unwrap_or(0),
            unresolved: u64::try_from(unresolved).unwrap_or(0),
        })
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<Owner>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, email_enabled, sms_enabled, sms_phone_number, \
             webhook_enabled, webhook_url FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Owner::from))
    }
}
