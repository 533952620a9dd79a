pub mod events;
pub mod publisher;
pub mod room_hub;

pub use events::{RealtimeEvent, StatusChange};
pub use publisher::RealtimePublisher;
pub use room_hub::{Connection, ConnectionId, RoomHub};
