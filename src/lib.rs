pub mod db;
pub mod ledger;
pub mod models;
pub mod runner;
pub mod scheduler;
pub mod sensor;
pub mod settings;
pub mod utils;

pub use db::Database;
pub use ledger::{RemoteStepLedger, StepLedger};
pub use models::{DailyStepRecord, JournalEntry, SyncOutcome};
pub use runner::{BackgroundRunner, RunnerConfig};
pub use scheduler::{scheduler_loop, ReconciliationEngine, SchedulerConfig};
pub use sensor::{step_feed, ChannelStepSensor, SensorStepSource, StepFeedHandle, StepSensor};
pub use settings::{SettingsStore, SyncSettings};
