use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;

use crate::ledger::StepLedger;
use crate::models::DailyStepRecord;
use crate::sensor::{SensorStepSource, StepSensor};

/// Steps taken today given the current cumulative reading and the recorded
/// baseline. A reading below the baseline means the counter was reset
/// (reboot or OS-level clear) since the baseline was taken; the reading
/// itself is then the day's total.
pub fn steps_for_day(current: u64, baseline: u64) -> u64 {
    if current < baseline {
        current
    } else {
        current - baseline
    }
}

/// Computes and uploads one day's step delta.
///
/// Baseline fetch and sensor read never fail by contract; both degrade to
/// `0`. The only fallible step is the ledger submission, so the returned
/// error is always a retryable submission failure.
pub struct ReconciliationEngine<L: StepLedger, S: StepSensor> {
    ledger: L,
    sensor: SensorStepSource<S>,
    sensor_timeout: Duration,
}

impl<L: StepLedger, S: StepSensor> ReconciliationEngine<L, S> {
    pub fn new(ledger: L, sensor: SensorStepSource<S>, sensor_timeout: Duration) -> Self {
        Self {
            ledger,
            sensor,
            sensor_timeout,
        }
    }

    /// One reconciliation attempt for `date`.
    pub async fn reconcile_once(
        &mut self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<DailyStepRecord> {
        let baseline = self.ledger.fetch_baseline(user_id).await;
        let current = self.sensor.read_current_steps(self.sensor_timeout).await;

        let record = DailyStepRecord {
            user_id: user_id.to_string(),
            date,
            steps: steps_for_day(current, baseline),
            midnight_step_count: current,
        };

        self.ledger.submit_daily_record(&record).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::step_feed;
    use anyhow::bail;
    use std::sync::{Arc, Mutex};

    #[derive(Clone)]
    struct FakeLedger {
        baseline: u64,
        fail_submits: bool,
        submitted: Arc<Mutex<Vec<DailyStepRecord>>>,
    }

    impl FakeLedger {
        fn new(baseline: u64) -> Self {
            Self {
                baseline,
                fail_submits: false,
                submitted: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl StepLedger for FakeLedger {
        async fn fetch_baseline(&self, _user_id: &str) -> u64 {
            self.baseline
        }

        async fn submit_daily_record(&self, record: &DailyStepRecord) -> Result<()> {
            if self.fail_submits {
                bail!("ledger unavailable");
            }
            self.submitted.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 29).unwrap()
    }

    #[test]
    fn delta_is_current_minus_baseline_when_counter_is_monotone() {
        assert_eq!(steps_for_day(4750, 4000), 750);
        assert_eq!(steps_for_day(4000, 4000), 0);
    }

    #[test]
    fn delta_is_the_raw_reading_after_a_sensor_reset() {
        assert_eq!(steps_for_day(120, 8000), 120);
        assert_eq!(steps_for_day(0, 8000), 0);
    }

    #[tokio::test]
    async fn normal_day_submits_delta_and_new_baseline() {
        let ledger = FakeLedger::new(4000);
        let submitted = ledger.submitted.clone();
        let (feed, sensor) = step_feed();
        feed.push(4750);

        let mut engine =
            ReconciliationEngine::new(ledger, SensorStepSource::new(sensor), Duration::from_secs(3));
        let record = engine.reconcile_once("user-1", date()).await.unwrap();

        assert_eq!(record.steps, 750);
        assert_eq!(record.midnight_step_count, 4750);
        let submitted = submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], record);
    }

    #[tokio::test]
    async fn rebooted_device_submits_the_raw_reading() {
        let ledger = FakeLedger::new(8000);
        let (feed, sensor) = step_feed();
        feed.push(120);

        let mut engine =
            ReconciliationEngine::new(ledger, SensorStepSource::new(sensor), Duration::from_secs(3));
        let record = engine.reconcile_once("user-1", date()).await.unwrap();

        assert_eq!(record.steps, 120);
        assert_eq!(record.midnight_step_count, 120);
    }

    #[tokio::test]
    async fn sensor_timeout_submits_zeros() {
        let ledger = FakeLedger::new(4000);
        let (_feed, sensor) = step_feed();

        let mut engine = ReconciliationEngine::new(
            ledger,
            SensorStepSource::new(sensor),
            Duration::from_millis(10),
        );
        let record = engine.reconcile_once("user-1", date()).await.unwrap();

        assert_eq!(record.steps, 0);
        assert_eq!(record.midnight_step_count, 0);
    }

    #[tokio::test]
    async fn submission_failure_is_the_only_error_path() {
        let mut ledger = FakeLedger::new(4000);
        ledger.fail_submits = true;
        // Sensor times out too; the combination must still be a plain
        // failure signal, not a panic.
        let (_feed, sensor) = step_feed();

        let mut engine = ReconciliationEngine::new(
            ledger,
            SensorStepSource::new(sensor),
            Duration::from_millis(10),
        );
        let result = engine.reconcile_once("user-1", date()).await;
        assert!(result.is_err());
    }
}
