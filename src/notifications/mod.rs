pub mod models;
pub mod senders;
pub mod service;

pub use models::{ChannelConfig, ChannelKind, Notification};
pub use service::{DispatchReport, NotificationService};
