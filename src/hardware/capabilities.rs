//! Atomic Hardware Capabilities
//!
//! Fine-grained capability traits the calibration loop is written against.
//! The sweep controller only ever talks to these traits; the concrete
//! drivers ([`crate::hardware::keysight`], [`crate::hardware::particle`])
//! and the simulated endpoints in [`crate::hardware::mock`] provide the
//! implementations.
//!
//! Each capability trait:
//! - Is async (uses `#[async_trait]`)
//! - Is thread-safe (requires `Send + Sync`)
//! - Uses `anyhow::Result` for errors; drivers attach their typed error
//!   values at the fault site
//! - Focuses on ONE endpoint

use anyhow::Result;
use async_trait::async_trait;

/// Result of an idempotent output toggle request.
///
/// "Already in the requested state" is an expected condition, not a fault:
/// drivers query the output state first and skip the relay command when
/// nothing would change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTransition {
    /// Output was off and has been switched on.
    Enabled,
    /// Output was already on; no command issued.
    AlreadyEnabled,
    /// Output was on and has been switched off.
    Disabled,
    /// Output was already off; no command issued.
    AlreadyDisabled,
}

/// Capability: Programmable Power Supply
///
/// # Contract
/// - `open()` establishes the instrument session; opening an already-open
///   link is success, not an error
/// - `set_voltage` / `set_current` command setpoints without waiting for
///   the output to settle
/// - `enable_output` / `disable_output` query the output state first and
///   only issue the toggle when the state would change
/// - `read_voltage` / `read_current` return the instrument's own measured
///   output (observed values, not the commanded setpoints)
/// - `close()` releases the session; closing a never-opened link is a
///   defined no-op
///
/// # Thread Safety
/// - All methods take `&self`; drivers guard the link with interior
///   mutability so one exclusive session serves the whole run
#[async_trait]
pub trait PowerSupply: Send + Sync {
    /// Open the instrument session, or reuse one that is already open.
    async fn open(&self) -> Result<()>;

    /// Release the session. No-op when the link was never opened.
    async fn close(&self) -> Result<()>;

    /// Query the instrument identity string (`*IDN?`).
    async fn identify(&self) -> Result<String>;

    /// Command a voltage setpoint in volts.
    async fn set_voltage(&self, volts: f64) -> Result<()>;

    /// Command a current setpoint in amps.
    async fn set_current(&self, amps: f64) -> Result<()>;

    /// Read the measured output voltage in volts.
    async fn read_voltage(&self) -> Result<f64>;

    /// Read the measured output current in amps.
    async fn read_current(&self) -> Result<f64>;

    /// Switch the output on unless it is already on.
    async fn enable_output(&self) -> Result<OutputTransition>;

    /// Switch the output off unless it is already off.
    async fn disable_output(&self) -> Result<OutputTransition>;
}

/// Capability: Remote Inverter Sensor
///
/// # Contract
/// - One call returns the full ordered snapshot of per-channel values
/// - Values are the raw numeric tokens the device reported (validated
///   numeric, never reformatted) so exported tables match the firmware's
///   own formatting
/// - HTTP failures, timeouts and malformed payloads are errors; the sensor
///   never substitutes placeholder values
#[async_trait]
pub trait InverterSensor: Send + Sync {
    /// Fetch the measured voltage of every inverter channel, in channel order.
    async fn measured_voltages(&self) -> Result<Vec<String>>;

    /// Fetch the measured current of every inverter channel, in channel order.
    async fn measured_currents(&self) -> Result<Vec<String>>;

    /// Number of inverter channels currently reporting.
    async fn inverter_count(&self) -> Result<usize>;
}
