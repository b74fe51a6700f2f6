//! Setpoint sequence generation.
//!
//! A [`SweepSequence`] turns the configured start/increment/limit into the
//! ordered swept values for one run. Three modes:
//! - `RampUp`: start to limit in fixed increments, one pass
//! - `Triangle`: oscillates between the bounds until cancelled
//! - `Mapped`: ramp over desired current, with the commanded voltage
//!   derived through a fixed conversion factor

use crate::error::CalError;
use serde::Deserialize;

/// Tolerance for float accumulation at the ramp boundary.
const BOUND_EPS: f64 = 1e-9;

/// Sweep progression mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Linear voltage ramp from start to limit, one pass.
    #[default]
    RampUp,
    /// Endless voltage triangle wave between start and limit.
    Triangle,
    /// Current ramp commanded as conversion-mapped voltages.
    Mapped,
}

impl SweepMode {
    /// Whether this mode sweeps current (thermal pacing, current table)
    /// rather than voltage.
    pub fn sweeps_current(&self) -> bool {
        matches!(self, SweepMode::Mapped)
    }

    /// Whether the sequence terminates on its own.
    pub fn is_bounded(&self) -> bool {
        !matches!(self, SweepMode::Triangle)
    }
}

/// One commanded (voltage, current) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    /// Commanded voltage in volts.
    pub volts: f64,
    /// Commanded current limit in amps.
    pub amps: f64,
}

/// Generator of swept reference values.
///
/// Holds the current value and, for triangle mode, the travel direction.
/// State only changes through [`advance`](Self::advance), which the
/// controller calls after a step's sample is safely recorded.
#[derive(Debug, Clone)]
pub struct SweepSequence {
    mode: SweepMode,
    start: f64,
    increment: f64,
    limit: f64,
    value: f64,
    direction: f64,
    step_index: u64,
    exhausted: bool,
}

impl SweepSequence {
    /// Validate the parameters and position the sequence at its first value.
    ///
    /// A ramp whose start already lies past the limit is valid and starts
    /// terminal (zero values). A triangle needs `start <= limit` to have a
    /// band to oscillate in.
    pub fn new(mode: SweepMode, start: f64, increment: f64, limit: f64) -> Result<Self, CalError> {
        if !start.is_finite() || !increment.is_finite() || !limit.is_finite() {
            return Err(CalError::Sequence(
                "sweep parameters must be finite".to_string(),
            ));
        }
        if increment <= 0.0 {
            return Err(CalError::Sequence(format!(
                "increment must be positive, got {increment}"
            )));
        }
        if mode == SweepMode::Triangle && start > limit {
            return Err(CalError::Sequence(format!(
                "triangle sweep needs start <= limit, got {start} > {limit}"
            )));
        }

        let exhausted = mode.is_bounded() && start > limit;
        Ok(Self {
            mode,
            start,
            increment,
            limit,
            value: start,
            direction: 1.0,
            step_index: 0,
            exhausted,
        })
    }

    /// Reference value the next step should command.
    pub fn current(&self) -> f64 {
        self.value
    }

    /// True once every value has been produced. Never true for triangle.
    pub fn is_terminal(&self) -> bool {
        self.exhausted
    }

    /// Sweep mode this sequence was built for.
    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    /// Number of values a bounded sequence will produce; `None` for triangle.
    pub fn planned_steps(&self) -> Option<u64> {
        if !self.mode.is_bounded() {
            return None;
        }
        if self.start > self.limit {
            return Some(0);
        }
        Some((((self.limit - self.start) / self.increment) + BOUND_EPS).floor() as u64 + 1)
    }

    /// Move to the next value.
    ///
    /// Bounded modes recompute from the step index so float error cannot
    /// accumulate across a long ramp; the triangle walks its value and flips
    /// direction exactly at the bounds, without overshoot.
    pub fn advance(&mut self) {
        if self.exhausted {
            return;
        }
        match self.mode {
            SweepMode::RampUp | SweepMode::Mapped => {
                self.step_index += 1;
                let next = self.start + self.step_index as f64 * self.increment;
                if next > self.limit + BOUND_EPS {
                    self.exhausted = true;
                } else {
                    self.value = next.min(self.limit);
                }
            }
            SweepMode::Triangle => {
                let mut next = self.value + self.increment * self.direction;
                if next >= self.limit {
                    next = self.limit;
                    self.direction = -1.0;
                } else if next <= self.start {
                    next = self.start;
                    self.direction = 1.0;
                }
                self.value = next;
            }
        }
    }
}

/// Round a derived setpoint to the 3-decimal precision the calibration
/// tables are built on.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
