//! Sweep run state machine.
//!
//! [`SweepController`] owns one calibration run end to end: it connects the
//! supply, walks the [`SweepSequence`], applies each setpoint through the
//! retry policy, records the paired reference/measured samples, and always
//! leaves the supply safe (zeroed, output off, link closed) no matter how
//! the run ends.
//!
//! Lifecycle: `Idle -> Connecting -> Stepping -> Complete | Aborted`.
//! Progress is published on a watch channel; cancellation is cooperative
//! and honored between steps, never in the middle of one.

use crate::data::samples::{Sample, SampleStore};
use crate::error::AppResult;
use crate::hardware::capabilities::{InverterSensor, PowerSupply};
use crate::sweep::retry::{RetryOutcome, RetryPolicy};
use crate::sweep::sequence::{round3, Setpoint, SweepMode, SweepSequence};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// =============================================================================
// Run Parameters
// =============================================================================

/// Immutable sweep-run parameters.
///
/// Captured at controller construction; nothing mutates them afterwards.
/// Defaults mirror the bench voltage procedure: 0-50 V in 1 V steps at a
/// 0.2 A stabilizing current, three attempts per step.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSettings {
    /// Progression mode.
    #[serde(default)]
    pub mode: SweepMode,
    /// First swept value (volts, or amps for mapped sweeps).
    #[serde(default = "default_start_value")]
    pub start_value: f64,
    /// Distance between consecutive swept values.
    #[serde(default = "default_increment")]
    pub increment: f64,
    /// Inclusive upper bound of the swept value.
    #[serde(default = "default_limit")]
    pub limit: f64,
    /// Fixed setpoint for the non-swept quantity (the current limit on
    /// voltage sweeps, and the parked current limit on mapped sweeps).
    #[serde(default = "default_stabilizing_constant")]
    pub stabilizing_constant: f64,
    /// Volts commanded per amp of desired current on mapped sweeps.
    #[serde(default = "default_conversion_factor")]
    pub conversion_factor: f64,
    /// Total invocations allowed per retryable operation.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Settling time after a voltage step.
    #[serde(with = "humantime_serde", default = "default_settle_delay")]
    pub settle_delay: Duration,
    /// Heat dissipation time after a current step.
    #[serde(with = "humantime_serde", default = "default_thermal_delay")]
    pub thermal_delay: Duration,
}

fn default_start_value() -> f64 {
    0.0
}

fn default_increment() -> f64 {
    1.0
}

fn default_limit() -> f64 {
    50.0
}

fn default_stabilizing_constant() -> f64 {
    0.2
}

fn default_conversion_factor() -> f64 {
    100.0 / 27.0
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_thermal_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            mode: SweepMode::default(),
            start_value: default_start_value(),
            increment: default_increment(),
            limit: default_limit(),
            stabilizing_constant: default_stabilizing_constant(),
            conversion_factor: default_conversion_factor(),
            max_retry_attempts: default_max_retry_attempts(),
            settle_delay: default_settle_delay(),
            thermal_delay: default_thermal_delay(),
        }
    }
}

// =============================================================================
// Run State
// =============================================================================

/// Lifecycle of one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    /// Not yet started.
    Idle,
    /// Establishing the supply link.
    Connecting,
    /// Applying setpoints and recording samples.
    Stepping,
    /// Walked the whole sequence; supply shut down.
    Complete,
    /// Gave up after exhausted retries or cancellation; supply shut down.
    Aborted,
}

/// Why a sweep ended in [`SweepState::Aborted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    /// The retry policy ran out of attempts on an operation.
    RetriesExhausted {
        /// Operation that kept failing.
        operation: String,
        /// Invocations made before giving up.
        attempts: u32,
        /// Error from the final invocation.
        last_error: String,
    },
    /// The operator cancelled the run.
    Cancelled,
}

/// Progress snapshot published on the watch channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepProgress {
    /// Current lifecycle state.
    pub state: SweepState,
    /// Steps that have recorded a sample.
    pub steps_completed: u64,
    /// Reference value of the most recent recorded step.
    pub last_reference: Option<f64>,
}

impl Default for SweepProgress {
    fn default() -> Self {
        Self {
            state: SweepState::Idle,
            steps_completed: 0,
            last_reference: None,
        }
    }
}

/// Summary of one finished sweep run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    /// Terminal state, `Complete` or `Aborted`.
    pub state: SweepState,
    /// Steps that recorded a sample.
    pub steps_completed: u64,
    /// Abort cause when the run did not complete.
    pub abort_reason: Option<AbortReason>,
}

/// Observer and cancellation handle for a running sweep.
#[derive(Clone)]
pub struct SweepHandle {
    progress_rx: watch::Receiver<SweepProgress>,
    cancel_tx: watch::Sender<bool>,
}

impl SweepHandle {
    /// Request cooperative cancellation; the controller honors it between
    /// steps and still runs its shutdown sequence.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Latest progress snapshot.
    pub fn progress(&self) -> SweepProgress {
        self.progress_rx.borrow().clone()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Drives one sweep run against a supply and a sensor.
///
/// `run` takes `&mut self`, so one controller can never execute two sweeps
/// against its endpoints concurrently.
pub struct SweepController {
    supply: Arc<dyn PowerSupply>,
    sensor: Arc<dyn InverterSensor>,
    settings: SweepSettings,
    policy: RetryPolicy,
    pacing: Duration,
    store: SampleStore,
    progress: SweepProgress,
    progress_tx: watch::Sender<SweepProgress>,
    cancel_rx: watch::Receiver<bool>,
}

impl SweepController {
    /// Build a controller over the given endpoints.
    pub fn new(
        supply: Arc<dyn PowerSupply>,
        sensor: Arc<dyn InverterSensor>,
        settings: SweepSettings,
    ) -> (Self, SweepHandle) {
        // The pacing delay doubles as the retry delay: a step that failed on
        // a voltage sweep retries after the settle time, one on a current
        // sweep after the heat dissipation time.
        let pacing = if settings.mode.sweeps_current() {
            settings.thermal_delay
        } else {
            settings.settle_delay
        };
        let policy = RetryPolicy::new(settings.max_retry_attempts, pacing);

        let (progress_tx, progress_rx) = watch::channel(SweepProgress::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let controller = Self {
            supply,
            sensor,
            settings,
            policy,
            pacing,
            store: SampleStore::new(),
            progress: SweepProgress::default(),
            progress_tx,
            cancel_rx,
        };
        let handle = SweepHandle {
            progress_rx,
            cancel_tx,
        };
        (controller, handle)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SweepState {
        self.progress.state
    }

    /// Samples recorded so far.
    pub fn samples(&self) -> &SampleStore {
        &self.store
    }

    /// Execute the sweep to completion or abort.
    ///
    /// An invalid sweep definition fails here before anything touches the
    /// instrument. Exhausted retries and cancellation are reported through
    /// the returned [`SweepReport`], not as errors, and every exit path
    /// runs the supply shutdown sequence first.
    pub async fn run(&mut self) -> AppResult<SweepReport> {
        let mut sequence = SweepSequence::new(
            self.settings.mode,
            self.settings.start_value,
            self.settings.increment,
            self.settings.limit,
        )?;

        info!(
            mode = ?self.settings.mode,
            start = self.settings.start_value,
            increment = self.settings.increment,
            limit = self.settings.limit,
            planned_steps = ?sequence.planned_steps(),
            "sweep starting"
        );
        self.set_state(SweepState::Connecting);

        let supply = Arc::clone(&self.supply);
        let connect = self.policy.run("supply connect", || supply.open()).await;
        if let RetryOutcome::Exhausted {
            attempts,
            last_error,
        } = connect
        {
            error!(attempts, "supply connection failed: {}", last_error);
            self.shutdown_supply().await;
            self.set_state(SweepState::Aborted);
            return Ok(SweepReport {
                state: SweepState::Aborted,
                steps_completed: 0,
                abort_reason: Some(AbortReason::RetriesExhausted {
                    operation: "supply connect".to_string(),
                    attempts,
                    last_error: last_error.to_string(),
                }),
            });
        }

        self.set_state(SweepState::Stepping);
        let mut steps_completed: u64 = 0;
        let mut abort_reason = None;

        while !sequence.is_terminal() {
            if self.is_cancelled() {
                info!("cancellation requested; stopping sweep");
                abort_reason = Some(AbortReason::Cancelled);
                break;
            }

            let reference = sequence.current();
            let outcome = self
                .policy
                .run("calibration step", || self.step_unit(reference))
                .await;

            match outcome {
                RetryOutcome::Success {
                    value: measured,
                    attempts,
                } => {
                    if attempts > 1 {
                        info!(reference, attempts, "step recovered after retries");
                    }
                    self.record_sample(reference, measured);
                    steps_completed += 1;
                    self.note_step(steps_completed, reference);
                    sequence.advance();
                }
                RetryOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    error!(reference, attempts, "step failed permanently: {}", last_error);
                    abort_reason = Some(AbortReason::RetriesExhausted {
                        operation: "calibration step".to_string(),
                        attempts,
                        last_error: last_error.to_string(),
                    });
                    break;
                }
            }
        }

        self.shutdown_supply().await;

        let state = if abort_reason.is_none() {
            SweepState::Complete
        } else {
            SweepState::Aborted
        };
        self.set_state(state);
        info!(
            ?state,
            steps_completed,
            voltage_rows = self.store.voltage_row_count(),
            current_rows = self.store.current_row_count(),
            "sweep finished"
        );

        Ok(SweepReport {
            state,
            steps_completed,
            abort_reason,
        })
    }

    /// One retryable calibration step: apply the setpoint pair, make sure
    /// the output is live, read the supply's own meters back, wait for the
    /// output to settle, then fetch the sensor snapshot.
    async fn step_unit(&self, reference: f64) -> Result<Vec<String>> {
        let setpoint = self.setpoint_for(reference);
        self.supply.set_voltage(setpoint.volts).await?;
        self.supply.set_current(setpoint.amps).await?;
        self.supply.enable_output().await?;

        let supply_volts = self.supply.read_voltage().await?;
        let supply_amps = self.supply.read_current().await?;
        debug!(
            reference,
            commanded_volts = setpoint.volts,
            supply_volts,
            supply_amps,
            "setpoint applied"
        );

        tokio::time::sleep(self.pacing).await;

        if self.settings.mode.sweeps_current() {
            self.sensor.measured_currents().await
        } else {
            self.sensor.measured_voltages().await
        }
    }

    /// Setpoint pair for a swept reference value.
    fn setpoint_for(&self, reference: f64) -> Setpoint {
        let volts = if self.settings.mode.sweeps_current() {
            round3(self.settings.conversion_factor * reference)
        } else {
            reference
        };
        Setpoint {
            volts,
            amps: self.settings.stabilizing_constant,
        }
    }

    fn record_sample(&mut self, reference: f64, measured: Vec<String>) {
        let sample = Sample::new(reference, measured);
        if self.settings.mode.sweeps_current() {
            self.store.append_current_sample(sample);
        } else {
            self.store.append_voltage_sample(sample);
        }
    }

    /// Drive the supply to a safe state and release the link.
    ///
    /// Runs on every exit path. Each command is best-effort: a failure is
    /// logged and the remaining commands still run.
    async fn shutdown_supply(&self) {
        if let Err(e) = self.supply.set_voltage(0.0).await {
            warn!("shutdown: zeroing voltage failed: {}", e);
        }
        if let Err(e) = self.supply.set_current(0.0).await {
            warn!("shutdown: zeroing current failed: {}", e);
        }
        match self.supply.disable_output().await {
            Ok(transition) => debug!(?transition, "shutdown: output disabled"),
            Err(e) => warn!("shutdown: disabling output failed: {}", e),
        }
        if let Err(e) = self.supply.close().await {
            warn!("shutdown: closing link failed: {}", e);
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    fn set_state(&mut self, state: SweepState) {
        self.progress.state = state;
        let _ = self.progress_tx.send(self.progress.clone());
    }

    fn note_step(&mut self, steps_completed: u64, reference: f64) {
        self.progress.steps_completed = steps_completed;
        self.progress.last_reference = Some(reference);
        let _ = self.progress_tx.send(self.progress.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockSensor, MockSupply};

    fn controller_with(settings: SweepSettings) -> (SweepController, SweepHandle) {
        let supply: Arc<dyn PowerSupply> = Arc::new(MockSupply::new());
        let sensor: Arc<dyn InverterSensor> = Arc::new(MockSensor::new(3));
        SweepController::new(supply, sensor, settings)
    }

    #[test]
    fn defaults_mirror_bench_procedure() {
        let settings: SweepSettings = toml::from_str("").unwrap();
        assert_eq!(settings.mode, SweepMode::RampUp);
        assert_eq!(settings.start_value, 0.0);
        assert_eq!(settings.increment, 1.0);
        assert_eq!(settings.limit, 50.0);
        assert_eq!(settings.stabilizing_constant, 0.2);
        assert_eq!(settings.max_retry_attempts, 3);
        assert_eq!(settings.settle_delay, Duration::from_secs(1));
        assert_eq!(settings.thermal_delay, Duration::from_secs(60));
        assert!((settings.conversion_factor - 100.0 / 27.0).abs() < 1e-12);
    }

    #[test]
    fn settings_parse_human_durations() {
        let settings: SweepSettings = toml::from_str(
            r#"
                mode = "mapped"
                settle_delay = "250ms"
                thermal_delay = "60s"
            "#,
        )
        .unwrap();
        assert_eq!(settings.mode, SweepMode::Mapped);
        assert_eq!(settings.settle_delay, Duration::from_millis(250));
        assert_eq!(settings.thermal_delay, Duration::from_secs(60));
    }

    #[test]
    fn mapped_setpoints_round_to_three_decimals() {
        let settings = SweepSettings {
            mode: SweepMode::Mapped,
            stabilizing_constant: 10.0,
            ..SweepSettings::default()
        };
        let (controller, _handle) = controller_with(settings);

        let setpoint = controller.setpoint_for(10.0);
        assert_eq!(setpoint.volts, 37.037);
        assert_eq!(setpoint.amps, 10.0);
    }

    #[test]
    fn voltage_sweeps_command_the_reference_directly() {
        let (controller, _handle) = controller_with(SweepSettings::default());
        let setpoint = controller.setpoint_for(12.0);
        assert_eq!(setpoint.volts, 12.0);
        assert_eq!(setpoint.amps, 0.2);
    }

    #[test]
    fn pacing_follows_the_swept_quantity() {
        let voltage = SweepSettings {
            settle_delay: Duration::from_millis(5),
            thermal_delay: Duration::from_secs(60),
            ..SweepSettings::default()
        };
        let (controller, _handle) = controller_with(voltage);
        assert_eq!(controller.pacing, Duration::from_millis(5));

        let current = SweepSettings {
            mode: SweepMode::Mapped,
            settle_delay: Duration::from_millis(5),
            thermal_delay: Duration::from_millis(40),
            ..SweepSettings::default()
        };
        let (controller, _handle) = controller_with(current);
        assert_eq!(controller.pacing, Duration::from_millis(40));
    }

    #[test]
    fn controller_starts_idle() {
        let (controller, handle) = controller_with(SweepSettings::default());
        assert_eq!(controller.state(), SweepState::Idle);
        assert_eq!(handle.progress().state, SweepState::Idle);
        assert_eq!(handle.progress().steps_completed, 0);
    }
}
