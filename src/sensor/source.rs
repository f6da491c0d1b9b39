use std::time::Duration;

use anyhow::Result;
use log::warn;

/// Seam over the platform pedometer. Implementations own their listener
/// state; there is no free-standing module-level counter anywhere.
#[allow(async_fn_in_trait)]
pub trait StepSensor: Send {
    /// Activate the underlying listener.
    fn start(&mut self) -> Result<()>;
    /// Deactivate the listener and drop any buffered readings so a stale
    /// value cannot satisfy a later read.
    fn stop(&mut self);
    /// Wait for the next cumulative step reading. `None` means the feed
    /// closed and no reading will ever arrive.
    async fn next_reading(&mut self) -> Option<u64>;
}

/// Single-shot read over a [`StepSensor`] with a bounded wait.
///
/// The listener is transiently active for the duration of one call only:
/// it is started, raced against the timeout, and always stopped before the
/// call returns. A timeout is not an error; the defined fallback is `0`.
pub struct SensorStepSource<S: StepSensor> {
    sensor: S,
}

impl<S: StepSensor> SensorStepSource<S> {
    pub fn new(sensor: S) -> Self {
        Self { sensor }
    }

    /// Current cumulative step count since the last sensor reset, or `0` if
    /// no reading arrives within `timeout`.
    pub async fn read_current_steps(&mut self, timeout: Duration) -> u64 {
        if let Err(err) = self.sensor.start() {
            warn!("step sensor failed to start: {err:#}; treating reading as 0");
            self.sensor.stop();
            return 0;
        }

        let value = match tokio::time::timeout(timeout, self.sensor.next_reading()).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!("step sensor feed closed before a reading arrived");
                0
            }
            Err(_) => {
                warn!(
                    "no step reading within {}ms, falling back to 0",
                    timeout.as_millis()
                );
                0
            }
        };

        self.sensor.stop();
        value
    }
}
