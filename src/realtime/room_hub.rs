use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::models::UserId;

pub type ConnectionId = Uuid;

const CONNECTION_QUEUE_CAPACITY: usize = 64;
const GLOBAL_CHANNEL_CAPACITY: usize = 256;

/// Addressable delivery target for one user's live connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RoomKey(UserId);

impl From<UserId> for RoomKey {
    fn from(user: UserId) -> Self {
        RoomKey(user)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user_{}", self.0)
    }
}

/// Receiving side handed to a socket task on connect.
pub struct Connection {
    pub id: ConnectionId,
    pub room_rx: mpsc::Receiver<String>,
    pub global_rx: broadcast::Receiver<String>,
}

/// Tracks live connections, their room memberships, and the global channel.
#[derive(Debug)]
pub struct RoomHub {
    connections: DashMap<ConnectionId, mpsc::Sender<String>>,
    memberships: DashMap<ConnectionId, HashSet<RoomKey>>,
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
    global_tx: broadcast::Sender<String>,
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomHub {
    pub fn new() -> Self {
        let (global_tx, _) = broadcast::channel(GLOBAL_CHANNEL_CAPACITY);
        Self {
            connections: DashMap::new(),
            memberships: DashMap::new(),
            rooms: DashMap::new(),
            global_tx,
        }
    }

    pub fn connect(&self) -> Connection {
        let id = Uuid::new_v4();
        let (tx, room_rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
        self.connections.insert(id, tx);
        self.memberships.insert(id, HashSet::new());
        debug!(connection_id = %id, "Realtime connection registered.");
        Connection {
            id,
            room_rx,
            global_rx: self.global_tx.subscribe(),
        }
    }

    /// Adds the connection to the user's room. False if the connection is gone.
    pub fn join(&self, connection: ConnectionId, user: UserId) -> bool {
        let key = RoomKey::from(user);
        let Some(mut joined) = self.memberships.get_mut(&connection) else {
            warn!(connection_id = %connection, room = %key, "Join for unknown connection.");
            return false;
        };
        joined.insert(key);
        self.rooms.entry(key).or_default().insert(connection);
        debug!(connection_id = %connection, room = %key, "Connection joined room.");
        true
    }

    /// Removes the connection from every room it joined.
    pub fn leave_all(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        if let Some((_, joined)) = self.memberships.remove(&connection) {
            for key in joined {
                let now_empty = match self.rooms.get_mut(&key) {
                    Some(mut members) => {
                        members.remove(&connection);
                        members.is_empty()
                    }
                    None => false,
                };
                if now_empty {
                    self.rooms.remove_if(&key, |_, members| members.is_empty());
                }
            }
        }
        debug!(connection_id = %connection, "Realtime connection removed.");
    }

    pub fn room_size(&self, user: UserId) -> usize {
        self.rooms
            .get(&RoomKey::from(user))
            .map(|members| members.len())
            .unwrap_or(0)
    }

    /// Queues `frame` on every member of the room. Returns false if any member
    /// queue was full or closed; the frame is dropped for that member.
    pub(crate) fn emit_to_room(&self, key: RoomKey, frame: &str) -> bool {
        let members: Vec<ConnectionId> = match self.rooms.get(&key) {
            Some(members) => members.iter().copied().collect(),
            None => {
                debug!(room = %key, "No live connections in room, event not delivered.");
                return true;
            }
        };

        let mut all_queued = true;
        for connection in members {
            let Some(tx) = self.connections.get(&connection).map(|tx| tx.clone()) else {
                continue;
            };
            if let Err(e) = tx.try_send(frame.to_string()) {
                warn!(room = %key, connection_id = %connection, error = %e, "Dropped realtime event for connection.");
                all_queued = false;
            }
        }
        all_queued
    }

    pub(crate) fn emit_global(&self, frame: &str) -> bool {
        let receiver_count = self.global_tx.receiver_count();
        if receiver_count == 0 {
            debug!("No active receivers, skipping global broadcast.");
            return true;
        }
        match self.global_tx.send(frame.to_string()) {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, receiver_count, "Failed to broadcast global event.");
                false
            }
        }
    }
}
