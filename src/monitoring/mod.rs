pub mod prober;
pub mod scheduler;
pub mod status_updater;

pub use prober::Prober;
pub use scheduler::{Scheduler, SweepReport};
pub use status_updater::{AlertSink, CheckOutcome, StatusUpdater, Transition};
