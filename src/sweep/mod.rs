//! Sweep sequencing, retry policy, and the run state machine.
//!
//! [`sequence`] generates the swept values, [`retry`] bounds how often a
//! failing operation is re-tried, and [`controller`] drives a whole run
//! while publishing progress and honoring cancellation.

pub mod controller;
pub mod retry;
pub mod sequence;

pub use controller::{
    AbortReason, SweepController, SweepHandle, SweepProgress, SweepReport, SweepSettings,
    SweepState,
};
pub use retry::{RetryOutcome, RetryPolicy};
pub use sequence::{round3, Setpoint, SweepMode, SweepSequence};
