pub mod controller;
pub mod engine;
pub mod state;

pub use controller::{scheduler_loop, SchedulerConfig};
pub use engine::{steps_for_day, ReconciliationEngine};
pub use state::{RetryDecision, ScheduleState, SchedulerPhase};
