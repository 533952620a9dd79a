pub mod alert_service;
pub mod rules;

pub use alert_service::{AlertError, AlertService};
