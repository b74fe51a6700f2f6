//! Mock Hardware Implementations
//!
//! Simulated endpoints for exercising the full sweep loop without a bench.
//! [`MockSupply`] tracks commanded setpoints, the output relay state, and
//! every command issued (so tests can assert the shutdown sequence).
//! [`MockSensor`] fabricates per-channel readings and can be scripted to
//! fail on chosen calls for retry and abort testing.

use crate::hardware::capabilities::{InverterSensor, OutputTransition, PowerSupply};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

// =============================================================================
// MockSupply - Simulated Power Supply
// =============================================================================

/// Mock power supply with scriptable open failures.
///
/// Mirrors the real driver's contract: setpoint and relay commands require
/// an open link, the relay toggles are idempotent, and closing a
/// never-opened link is a no-op.
pub struct MockSupply {
    opened: RwLock<bool>,
    output_on: RwLock<bool>,
    voltage: RwLock<f64>,
    current: RwLock<f64>,
    relay_toggles: AtomicU32,
    failing_opens: AtomicU32,
    command_log: RwLock<Vec<String>>,
}

impl MockSupply {
    /// Create a closed mock supply with the output off.
    pub fn new() -> Self {
        Self {
            opened: RwLock::new(false),
            output_on: RwLock::new(false),
            voltage: RwLock::new(0.0),
            current: RwLock::new(0.0),
            relay_toggles: AtomicU32::new(0),
            failing_opens: AtomicU32::new(0),
            command_log: RwLock::new(Vec::new()),
        }
    }

    /// Script the next `count` open attempts to fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.failing_opens.store(count, Ordering::SeqCst);
    }

    /// Number of times the output relay actually switched.
    pub fn relay_toggle_count(&self) -> u32 {
        self.relay_toggles.load(Ordering::SeqCst)
    }

    /// Commands issued so far, in order. Relay entries appear only when the
    /// relay actually switched.
    pub async fn issued_commands(&self) -> Vec<String> {
        self.command_log.read().await.clone()
    }

    /// Whether the link is currently open.
    pub async fn is_open(&self) -> bool {
        *self.opened.read().await
    }

    /// Whether the output relay is currently on.
    pub async fn is_output_on(&self) -> bool {
        *self.output_on.read().await
    }

    /// Last commanded voltage setpoint.
    pub async fn commanded_voltage(&self) -> f64 {
        *self.voltage.read().await
    }

    /// Last commanded current setpoint.
    pub async fn commanded_current(&self) -> f64 {
        *self.current.read().await
    }

    async fn ensure_open(&self) -> Result<()> {
        if !*self.opened.read().await {
            return Err(anyhow!("MockSupply: link not open"));
        }
        Ok(())
    }
}

impl Default for MockSupply {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PowerSupply for MockSupply {
    async fn open(&self) -> Result<()> {
        if self.failing_opens.load(Ordering::SeqCst) > 0 {
            self.failing_opens.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("MockSupply: scripted open failure"));
        }

        let mut opened = self.opened.write().await;
        if *opened {
            debug!("MockSupply: link already open");
        } else {
            *opened = true;
            debug!("MockSupply: link opened");
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut opened = self.opened.write().await;
        *opened = false;
        self.command_log.write().await.push("CLOSE".to_string());
        Ok(())
    }

    async fn identify(&self) -> Result<String> {
        self.ensure_open().await?;
        Ok("Mock Instruments,VIRT-PSU,0,1.0".to_string())
    }

    async fn set_voltage(&self, volts: f64) -> Result<()> {
        self.ensure_open().await?;
        *self.voltage.write().await = volts;
        self.command_log.write().await.push(format!("VOLT {volts}"));
        Ok(())
    }

    async fn set_current(&self, amps: f64) -> Result<()> {
        self.ensure_open().await?;
        *self.current.write().await = amps;
        self.command_log.write().await.push(format!("CURR {amps}"));
        Ok(())
    }

    async fn read_voltage(&self) -> Result<f64> {
        self.ensure_open().await?;
        Ok(*self.voltage.read().await)
    }

    async fn read_current(&self) -> Result<f64> {
        self.ensure_open().await?;
        Ok(*self.current.read().await)
    }

    async fn enable_output(&self) -> Result<OutputTransition> {
        self.ensure_open().await?;
        let mut output = self.output_on.write().await;
        if *output {
            return Ok(OutputTransition::AlreadyEnabled);
        }
        *output = true;
        self.relay_toggles.fetch_add(1, Ordering::SeqCst);
        self.command_log.write().await.push("OUTP ON".to_string());
        Ok(OutputTransition::Enabled)
    }

    async fn disable_output(&self) -> Result<OutputTransition> {
        self.ensure_open().await?;
        let mut output = self.output_on.write().await;
        if !*output {
            return Ok(OutputTransition::AlreadyDisabled);
        }
        *output = false;
        self.relay_toggles.fetch_add(1, Ordering::SeqCst);
        self.command_log.write().await.push("OUTP OFF".to_string());
        Ok(OutputTransition::Disabled)
    }
}

// =============================================================================
// MockSensor - Simulated Inverter Sensor
// =============================================================================

/// Mock inverter sensor with scriptable failures.
///
/// Fabricates `channels` readings centred on a settable level with ~1%
/// noise, formatted the way the real firmware prints them. Two failure
/// scripts cover the retry scenarios: `fail_next_fetches` makes the next N
/// measurement calls fail then recover, `fail_from_fetch` makes every call
/// from a given index onward fail.
pub struct MockSensor {
    channels: usize,
    level: RwLock<f64>,
    fetches: AtomicUsize,
    failing_fetches: AtomicUsize,
    fail_from: AtomicUsize,
}

impl MockSensor {
    /// Create a sensor reporting `channels` inverter boards.
    pub fn new(channels: usize) -> Self {
        Self {
            channels,
            level: RwLock::new(1.0),
            fetches: AtomicUsize::new(0),
            failing_fetches: AtomicUsize::new(0),
            fail_from: AtomicUsize::new(usize::MAX),
        }
    }

    /// Create a sensor whose readings centre on `level`.
    pub fn with_level(channels: usize, level: f64) -> Self {
        Self {
            level: RwLock::new(level),
            ..Self::new(channels)
        }
    }

    /// Move the value the fabricated readings centre on.
    pub async fn set_level(&self, level: f64) {
        *self.level.write().await = level;
    }

    /// Script the next `count` measurement fetches to fail, then recover.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Script every measurement fetch from `index` (0-based) onward to fail.
    pub fn fail_from_fetch(&self, index: usize) {
        self.fail_from.store(index, Ordering::SeqCst);
    }

    /// Measurement fetches made so far (count queries excluded).
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn fabricate(&self) -> Result<Vec<String>> {
        let index = self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing_fetches.load(Ordering::SeqCst) > 0 {
            self.failing_fetches.fetch_sub(1, Ordering::SeqCst);
            return Err(anyhow!("MockSensor: scripted failure on fetch {index}"));
        }
        if index >= self.fail_from.load(Ordering::SeqCst) {
            return Err(anyhow!("MockSensor: scripted failure on fetch {index}"));
        }

        let level = *self.level.read().await;
        let mut rng = rand::thread_rng();
        let span = level.abs().max(1.0) * 0.01;
        let values = (0..self.channels)
            .map(|_| format!("{:.2}", level + rng.gen_range(-span..=span)))
            .collect();
        Ok(values)
    }
}

#[async_trait]
impl InverterSensor for MockSensor {
    async fn measured_voltages(&self) -> Result<Vec<String>> {
        self.fabricate().await
    }

    async fn measured_currents(&self) -> Result<Vec<String>> {
        self.fabricate().await
    }

    async fn inverter_count(&self) -> Result<usize> {
        Ok(self.channels)
    }
}
