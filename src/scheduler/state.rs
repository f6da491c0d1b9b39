use std::time::Duration;

use chrono::{DateTime, Days, Duration as ChronoDuration, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SchedulerPhase {
    Idle,
    Waiting,
    Reconciling,
    RetryBackoff,
    DoneForDay,
}

/// What the scheduler should do after a failed reconciliation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfterBackoff,
    GiveUp,
}

/// Per-day scheduling state. Owned exclusively by the scheduler loop; no
/// external writer. Rebuilt from the wall clock on every wake, so an
/// arbitrarily long process suspension just fires the stale trigger
/// immediately instead of sleeping a bogus duration.
#[derive(Debug, Clone)]
pub struct ScheduleState {
    pub phase: SchedulerPhase,
    pub next_trigger: DateTime<Local>,
    /// Reconciliation attempts spent on the current day.
    pub attempt_count: u32,
    trigger_time: NaiveTime,
}

impl ScheduleState {
    pub fn new(now: DateTime<Local>, trigger_time: NaiveTime) -> Self {
        Self {
            phase: SchedulerPhase::Waiting,
            next_trigger: next_trigger_after(now, trigger_time),
            attempt_count: 0,
            trigger_time,
        }
    }

    pub fn trigger_is_due(&self, now: DateTime<Local>) -> bool {
        now >= self.next_trigger
    }

    /// Exact time left until the trigger; zero once it is due.
    pub fn sleep_duration(&self, now: DateTime<Local>) -> Duration {
        (self.next_trigger - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Enter an attempt: counts it and moves to `Reconciling`.
    pub fn begin_attempt(&mut self) {
        self.phase = SchedulerPhase::Reconciling;
        self.attempt_count += 1;
    }

    /// Record a failed attempt and decide whether the retry budget allows
    /// another one.
    pub fn record_failure(&mut self, max_attempts: u32) -> RetryDecision {
        if self.attempt_count >= max_attempts.max(1) {
            self.phase = SchedulerPhase::DoneForDay;
            RetryDecision::GiveUp
        } else {
            self.phase = SchedulerPhase::RetryBackoff;
            RetryDecision::RetryAfterBackoff
        }
    }

    pub fn finish_day(&mut self) {
        self.phase = SchedulerPhase::DoneForDay;
    }

    /// Re-arm for the following day: same time of day, exactly one calendar
    /// day later (not 24 h, so the trigger stays put across DST shifts).
    pub fn advance_day(&mut self) {
        let next_date = self.next_trigger.date_naive() + Days::new(1);
        self.next_trigger = resolve_local(next_date.and_time(self.trigger_time));
        self.attempt_count = 0;
        self.phase = SchedulerPhase::Waiting;
    }
}

/// First instant at or after `now` whose local time of day is `trigger`:
/// today if still ahead, otherwise tomorrow.
pub fn next_trigger_after(now: DateTime<Local>, trigger: NaiveTime) -> DateTime<Local> {
    let today = resolve_local(now.date_naive().and_time(trigger));
    if today > now {
        today
    } else {
        resolve_local((now.date_naive() + Days::new(1)).and_time(trigger))
    }
}

/// Map a naive local datetime onto the timeline. Ambiguous times (DST fall
/// back) resolve to the earlier instant; nonexistent times (spring forward)
/// are pushed an hour later.
fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => resolve_local(naive + ChronoDuration::hours(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Mid-June dates sit well away from DST transitions in any timezone the
    // tests might run under.
    fn local(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Local> {
        resolve_local(
            chrono::NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, s)
                .unwrap(),
        )
    }

    fn trigger(h: u32, min: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn trigger_later_today_stays_on_today() {
        let now = local(2026, 6, 15, 10, 0, 0);
        let state = ScheduleState::new(now, trigger(23, 30));
        assert_eq!(state.next_trigger.date_naive(), now.date_naive());
        assert_eq!(state.next_trigger.time(), trigger(23, 30));
        assert_eq!(state.phase, SchedulerPhase::Waiting);
    }

    #[test]
    fn trigger_already_past_moves_to_tomorrow() {
        let now = local(2026, 6, 15, 10, 0, 0);
        let state = ScheduleState::new(now, trigger(9, 0));
        assert_eq!(
            state.next_trigger.date_naive(),
            now.date_naive() + Days::new(1)
        );
        assert_eq!(state.next_trigger.time(), trigger(9, 0));
    }

    #[test]
    fn sleep_duration_is_exactly_trigger_minus_now() {
        let now = local(2026, 6, 15, 23, 59, 10);
        let state = ScheduleState::new(now, NaiveTime::from_hms_opt(23, 59, 30).unwrap());
        assert!(!state.trigger_is_due(now));
        assert_eq!(state.sleep_duration(now), Duration::from_secs(20));
    }

    #[test]
    fn stale_trigger_fires_immediately_after_suspension() {
        let now = local(2026, 6, 15, 0, 30, 0);
        let mut state = ScheduleState::new(now, trigger(1, 0));
        // Simulate a multi-day suspension past the armed trigger.
        let resumed = local(2026, 6, 18, 14, 0, 0);
        assert!(state.trigger_is_due(resumed));
        assert_eq!(state.sleep_duration(resumed), Duration::ZERO);
        state.advance_day();
        // Re-arming is relative to the armed trigger, not the resume time.
        assert_eq!(
            state.next_trigger.date_naive(),
            now.date_naive() + Days::new(1)
        );
    }

    #[test]
    fn advance_day_moves_one_calendar_day_and_resets_attempts() {
        let now = local(2026, 6, 15, 10, 0, 0);
        let mut state = ScheduleState::new(now, trigger(23, 0));
        let before = state.next_trigger;
        state.attempt_count = 3;
        state.finish_day();

        state.advance_day();
        assert_eq!(
            state.next_trigger.date_naive(),
            before.date_naive() + Days::new(1)
        );
        assert_eq!(state.next_trigger.time(), trigger(23, 0));
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.phase, SchedulerPhase::Waiting);
    }

    #[test]
    fn retry_budget_allows_exactly_max_attempts() {
        let now = local(2026, 6, 15, 10, 0, 0);
        let mut state = ScheduleState::new(now, trigger(23, 0));

        let mut attempts = 0;
        loop {
            state.begin_attempt();
            attempts += 1;
            match state.record_failure(5) {
                RetryDecision::RetryAfterBackoff => {
                    assert_eq!(state.phase, SchedulerPhase::RetryBackoff);
                }
                RetryDecision::GiveUp => break,
            }
        }
        assert_eq!(attempts, 5);
        assert_eq!(state.attempt_count, 5);
        assert_eq!(state.phase, SchedulerPhase::DoneForDay);
    }

    #[test]
    fn zero_max_attempts_still_permits_a_single_attempt() {
        let now = local(2026, 6, 15, 10, 0, 0);
        let mut state = ScheduleState::new(now, trigger(23, 0));
        state.begin_attempt();
        assert_eq!(state.record_failure(0), RetryDecision::GiveUp);
    }
}
