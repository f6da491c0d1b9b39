pub mod record;

pub use record::{DailyStepRecord, JournalEntry, SyncOutcome};
