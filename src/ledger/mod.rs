pub mod client;

pub use client::{RemoteStepLedger, StepLedger};
