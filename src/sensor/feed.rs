use anyhow::Result;
use log::debug;
use tokio::sync::mpsc;

use super::source::StepSensor;

/// Sender half handed to the platform pedometer bridge. Cloneable; pushing
/// while no read is in flight buffers the reading, and a later read sees
/// only the newest buffered value.
#[derive(Clone)]
pub struct StepFeedHandle {
    tx: mpsc::UnboundedSender<u64>,
}

impl StepFeedHandle {
    /// Push a cumulative step count into the feed.
    pub fn push(&self, value: u64) {
        let _ = self.tx.send(value);
    }

    /// Push a raw platform event payload (a string-encoded integer, the
    /// shape the "StepCounter" sensor event carries). Unparseable payloads
    /// are dropped. Returns whether the payload was accepted.
    pub fn push_event(&self, payload: &str) -> bool {
        match parse_step_event(payload) {
            Some(value) => {
                self.push(value);
                true
            }
            None => {
                debug!("dropping unparseable step event payload '{payload}'");
                false
            }
        }
    }
}

/// Create a connected (platform feed, sensor) pair.
pub fn step_feed() -> (StepFeedHandle, ChannelStepSensor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StepFeedHandle { tx }, ChannelStepSensor { rx, active: false })
}

/// [`StepSensor`] backed by a channel the platform layer writes into.
pub struct ChannelStepSensor {
    rx: mpsc::UnboundedReceiver<u64>,
    active: bool,
}

impl StepSensor for ChannelStepSensor {
    fn start(&mut self) -> Result<()> {
        // Idempotent; a listener that is already active stays active.
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.active = false;
        // Discard anything buffered during this activation; the next read
        // must see a fresh reading, not a leftover.
        while self.rx.try_recv().is_ok() {}
    }

    async fn next_reading(&mut self) -> Option<u64> {
        if !self.active {
            return None;
        }
        let mut latest = self.rx.recv().await?;
        // The bridge pushes whenever it likes, so a backlog can pile up
        // between reads. The counter is cumulative; only the newest buffered
        // value is the current count, everything older is stale.
        while let Ok(value) = self.rx.try_recv() {
            latest = value;
        }
        Some(latest)
    }
}

/// Decode the string payload of a step counter event. Accepts plain and
/// fractional decimal encodings; anything negative or non-numeric is `None`.
pub fn parse_step_event(payload: &str) -> Option<u64> {
    let trimmed = payload.trim();
    if let Ok(value) = trimmed.parse::<u64>() {
        return Some(value);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value as u64)
}
