use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one day's reconciliation cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncOutcome {
    Submitted,
    Abandoned,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Submitted => "Submitted",
            SyncOutcome::Abandoned => "Abandoned",
        }
    }
}

/// One day's step delta, computed by the reconciliation engine and pushed
/// to the remote ledger. Immutable once submitted; keyed by (user_id, date).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStepRecord {
    pub user_id: String,
    pub date: NaiveDate,
    /// Steps taken this day. Always >= 0, even across a sensor reset.
    pub steps: u64,
    /// Cumulative sensor count at reconciliation time; the next day's baseline.
    pub midnight_step_count: u64,
}

/// A row in the local sync journal: what happened for a given (user, date).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub steps: u64,
    pub midnight_step_count: u64,
    pub outcome: SyncOutcome,
    /// Reconciliation attempts spent on this date (1..=max_attempts).
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}
