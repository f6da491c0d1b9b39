use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::db::Database;
use crate::ledger::StepLedger;
use crate::models::{DailyStepRecord, JournalEntry, SyncOutcome};
use crate::sensor::StepSensor;
use crate::settings::SyncSettings;

use super::engine::ReconciliationEngine;
use super::state::{RetryDecision, ScheduleState};

// Set to false to silence the per-cycle logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub user_id: String,
    /// Local time of day at which the daily reconciliation fires.
    pub trigger_time: NaiveTime,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl SchedulerConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            user_id: settings.user_id.clone(),
            trigger_time: settings.trigger_time_of_day(),
            max_attempts: settings.max_attempts,
            retry_backoff: settings.retry_backoff(),
        }
    }
}

/// Perpetual per-user day-boundary loop.
///
/// Computes the next trigger instant from the wall clock, sleeps the exact
/// duration, runs one reconciliation cycle (with retries), journals the
/// outcome, and re-arms for the next calendar day. A wake past the armed
/// trigger (process suspension of any length) fires immediately instead of
/// sleeping a stale duration. Exits only on cancellation and never lets a
/// failure escape the top level.
///
/// The engine sits behind a `Mutex` so at most one reconciliation sequence
/// is ever in flight for the user, including across a runner restart.
pub async fn scheduler_loop<L, S>(
    config: SchedulerConfig,
    engine: Arc<Mutex<ReconciliationEngine<L, S>>>,
    db: Database,
    cancel: CancellationToken,
) where
    L: StepLedger,
    S: StepSensor,
{
    let mut state = ScheduleState::new(Local::now(), config.trigger_time);
    log_info!(
        "step sync armed for '{}', next trigger {}",
        config.user_id,
        state.next_trigger
    );

    loop {
        let now = Local::now();
        if !state.trigger_is_due(now) {
            tokio::select! {
                _ = sleep(state.sleep_duration(now)) => {}
                _ = cancel.cancelled() => {
                    log_info!("step sync loop shutting down");
                    break;
                }
            }
            // Woken at the trigger, or resumed from suspension with a stale
            // one; either way re-check against the wall clock.
            continue;
        }

        let date = state.next_trigger.date_naive();
        {
            let mut engine = engine.lock().await;
            run_day_cycle(&config, &mut engine, &db, &mut state, date, &cancel).await;
        }

        if cancel.is_cancelled() {
            break;
        }

        state.advance_day();
        log_info!("step sync re-armed, next trigger {}", state.next_trigger);
    }
}

/// One day's reconciliation cycle: attempt, retry on submission failure up
/// to the budget, journal what happened.
async fn run_day_cycle<L, S>(
    config: &SchedulerConfig,
    engine: &mut ReconciliationEngine<L, S>,
    db: &Database,
    state: &mut ScheduleState,
    date: NaiveDate,
    cancel: &CancellationToken,
) where
    L: StepLedger,
    S: StepSensor,
{
    // A restart between submission and the next day boundary must not
    // submit the same date twice; the journal remembers.
    match db.get_entry_for_date(&config.user_id, date).await {
        Ok(Some(entry)) if entry.outcome == SyncOutcome::Submitted => {
            log_info!("{date} already submitted ({} steps), skipping", entry.steps);
            state.finish_day();
            return;
        }
        Ok(_) => {}
        Err(err) => {
            log_warn!("journal lookup for {date} failed: {err:#}; proceeding");
        }
    }

    loop {
        state.begin_attempt();
        match engine.reconcile_once(&config.user_id, date).await {
            Ok(record) => {
                log_info!(
                    "submitted {} steps for {date} (midnight count {}) on attempt {}",
                    record.steps,
                    record.midnight_step_count,
                    state.attempt_count
                );
                journal_outcome(db, &record, SyncOutcome::Submitted, state.attempt_count).await;
                state.finish_day();
                return;
            }
            Err(err) => {
                log_warn!(
                    "reconciliation attempt {}/{} for {date} failed: {err:#}",
                    state.attempt_count,
                    config.max_attempts
                );

                match state.record_failure(config.max_attempts) {
                    RetryDecision::GiveUp => {
                        log_error!(
                            "giving up on {date} after {} attempts; next day is independent",
                            state.attempt_count
                        );
                        let abandoned = DailyStepRecord {
                            user_id: config.user_id.clone(),
                            date,
                            steps: 0,
                            midnight_step_count: 0,
                        };
                        journal_outcome(db, &abandoned, SyncOutcome::Abandoned, state.attempt_count)
                            .await;
                        return;
                    }
                    RetryDecision::RetryAfterBackoff => {
                        tokio::select! {
                            _ = sleep(config.retry_backoff) => {}
                            _ = cancel.cancelled() => return,
                        }
                    }
                }
            }
        }
    }
}

/// Journal writes are best effort; a local disk hiccup must not take down
/// the sync loop.
async fn journal_outcome(
    db: &Database,
    record: &DailyStepRecord,
    outcome: SyncOutcome,
    attempts: u32,
) {
    let entry = JournalEntry {
        id: Uuid::new_v4().to_string(),
        user_id: record.user_id.clone(),
        date: record.date,
        steps: record.steps,
        midnight_step_count: record.midnight_step_count,
        outcome,
        attempts,
        created_at: Utc::now(),
    };

    if let Err(err) = db.record_entry(&entry).await {
        log_error!("failed to journal {} for {}: {err:#}", outcome.as_str(), record.date);
    }
}
