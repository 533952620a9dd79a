use std::sync::Arc;
use tracing::{debug, error};

use super::events::RealtimeEvent;
use super::room_hub::{RoomHub, RoomKey};
use crate::db::models::{Alert, AlertView, UserId};

/// Pushes alert lifecycle events to the owning user's room. Every method is
/// fire-and-forget: failures are logged and reported as `false`, never raised.
#[derive(Debug, Clone)]
pub struct RealtimePublisher {
    hub: Arc<RoomHub>,
}

impl RealtimePublisher {
    pub fn new(hub: Arc<RoomHub>) -> Self {
        Self { hub }
    }

    pub fn emit_to_user(&self, user: impl Into<UserId>, event: &RealtimeEvent) -> bool {
        let user = user.into();
        let key = RoomKey::from(user);
        match serde_json::to_string(event) {
            Ok(frame) => {
                let delivered = self.hub.emit_to_room(key, &frame);
                debug!(room = %key, event = event.name(), delivered, "Emitted realtime event.");
                delivered
            }
            Err(e) => {
                error!(room = %key, event = event.name(), error = %e, "Failed to serialize realtime event.");
                false
            }
        }
    }

    pub fn emit_global(&self, event: &RealtimeEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(frame) => self.hub.emit_global(&frame),
            Err(e) => {
                error!(event = event.name(), error = %e, "Failed to serialize global event.");
                false
            }
        }
    }

    fn emit_with_refresh(&self, user: UserId, event: RealtimeEvent) -> bool {
        let sent = self.emit_to_user(user, &event);
        let refreshed = self.emit_to_user(user, &RealtimeEvent::RefreshUnreadCount);
        sent && refreshed
    }

    pub fn emit_new_alert(&self, view: &AlertView) -> bool {
        self.emit_with_refresh(UserId::from(view), RealtimeEvent::NewAlert(view.clone()))
    }

    pub fn emit_alert_read(&self, alert: &Alert) -> bool {
        self.emit_with_refresh(
            UserId::from(alert),
            RealtimeEvent::AlertRead { alert_id: alert.id },
        )
    }

    pub fn emit_mark_all_read(&self, user: impl Into<UserId>, modified_count: u64) -> bool {
        self.emit_with_refresh(user.into(), RealtimeEvent::MarkAllRead { modified_count })
    }

    pub fn emit_resolved(&self, alert: &Alert) -> bool {
        self.emit_with_refresh(
            UserId::from(alert),
            RealtimeEvent::AlertResolved {
                alert_id: alert.id,
                monitor_id: alert.monitor_id,
            },
        )
    }

    pub fn emit_cleared(&self, user: impl Into<UserId>, deleted_count: u64) -> bool {
        self.emit_with_refresh(user.into(), RealtimeEvent::ClearAllAlerts { deleted_count })
    }
}
