pub mod enums;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use store::{AlertFilter, AlertStore, HistoryStore, MonitorStore, StoreError, UserDirectory};
