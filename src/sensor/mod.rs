pub mod feed;
pub mod source;

pub use feed::{parse_step_event, step_feed, ChannelStepSensor, StepFeedHandle};
pub use source::{SensorStepSource, StepSensor};
