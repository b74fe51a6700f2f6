//! Keysight LAN Power Supply Driver
//!
//! Drives the bench supply over its raw SCPI socket (port 5025 on Keysight
//! LAN instruments). Two bench models are supported through
//! [`SupplyProfile`] presets; the command surface is identical between
//! them, only the output ratings differ.
//!
//! Protocol overview:
//! - Format: SCPI text commands, LF-terminated
//! - Setpoints: `VOLT <v>`, `CURR <i>`
//! - Output relay: `OUTP ON` / `OUTP OFF`, state queried with `OUTP?`
//! - Measurement: `MEAS:VOLT?`, `MEAS:CURR?`
//! - Identity: `*IDN?`

use crate::error::CalError;
use crate::hardware::capabilities::{OutputTransition, PowerSupply};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Supported bench supply models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupplyModel {
    /// Keysight N5767A system supply, 60 V / 25 A.
    #[default]
    N5767a,
    /// Keysight E36312A bench supply, 25 V / 2 A per output.
    E36312a,
}

/// Output ratings for one supported supply model.
///
/// The profile bounds the setpoints the driver will accept; a request
/// outside the ratings is rejected before anything is written to the
/// instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplyProfile {
    /// Model this profile describes.
    pub model: SupplyModel,
    /// Maximum programmable voltage in volts.
    pub max_voltage: f64,
    /// Maximum programmable current in amps.
    pub max_current: f64,
}

impl SupplyProfile {
    /// Preset ratings for a supported model.
    pub fn for_model(model: SupplyModel) -> Self {
        match model {
            SupplyModel::N5767a => Self {
                model,
                max_voltage: 60.0,
                max_current: 25.0,
            },
            SupplyModel::E36312a => Self {
                model,
                max_voltage: 25.0,
                max_current: 2.0,
            },
        }
    }
}

/// Driver for Keysight LAN bench supplies.
///
/// The TCP link is lazily established by [`PowerSupply::open`] and guarded
/// by a `Mutex` so command/response pairs never interleave.
pub struct KeysightSupply {
    endpoint: String,
    profile: SupplyProfile,
    link: Mutex<Option<BufReader<TcpStream>>>,
    timeout: Duration,
}

impl KeysightSupply {
    /// Create an unopened driver for the supply at `host:port`.
    pub fn new(host: &str, port: u16, profile: SupplyProfile, query_timeout: Duration) -> Self {
        Self {
            endpoint: format!("{host}:{port}"),
            profile,
            link: Mutex::new(None),
            timeout: query_timeout,
        }
    }

    /// Ratings profile this driver enforces.
    pub fn profile(&self) -> &SupplyProfile {
        &self.profile
    }

    /// Send a command that produces no response.
    async fn write_command(&self, command: &str) -> Result<()> {
        let mut link = self.link.lock().await;
        let stream = link
            .as_mut()
            .ok_or_else(|| CalError::Connection(format!("link to {} is not open", self.endpoint)))?;

        let cmd = format!("{command}\n");
        stream
            .get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("write '{command}' to {} failed", self.endpoint))?;
        Ok(())
    }

    /// Send a query and read one LF-terminated response line.
    async fn query(&self, command: &str) -> Result<String> {
        let mut link = self.link.lock().await;
        let stream = link
            .as_mut()
            .ok_or_else(|| CalError::Connection(format!("link to {} is not open", self.endpoint)))?;

        let cmd = format!("{command}\n");
        stream
            .get_mut()
            .write_all(cmd.as_bytes())
            .await
            .with_context(|| format!("write '{command}' to {} failed", self.endpoint))?;

        let mut response = String::new();
        tokio::time::timeout(self.timeout, stream.read_line(&mut response))
            .await
            .map_err(|_| {
                CalError::Connection(format!("query '{command}' to {} timed out", self.endpoint))
            })?
            .with_context(|| format!("read after '{command}' from {} failed", self.endpoint))?;

        Ok(response.trim().to_string())
    }
}

#[async_trait]
impl PowerSupply for KeysightSupply {
    async fn open(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        if link.is_some() {
            debug!(endpoint = %self.endpoint, "supply link already open");
            return Ok(());
        }

        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.endpoint))
            .await
            .map_err(|_| CalError::Connection(format!("connect to {} timed out", self.endpoint)))?
            .map_err(|e| CalError::Connection(format!("connect to {} failed: {e}", self.endpoint)))?;

        *link = Some(BufReader::new(stream));
        info!(endpoint = %self.endpoint, model = ?self.profile.model, "supply link opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        match link.take() {
            Some(mut stream) => {
                let _ = stream.get_mut().shutdown().await;
                info!(endpoint = %self.endpoint, "supply link closed");
            }
            None => debug!("close on never-opened supply link; nothing to do"),
        }
        Ok(())
    }

    async fn identify(&self) -> Result<String> {
        let identity = self.query("*IDN?").await?;
        info!(%identity, "instrument identification");
        Ok(identity)
    }

    async fn set_voltage(&self, volts: f64) -> Result<()> {
        if !(0.0..=self.profile.max_voltage).contains(&volts) {
            return Err(anyhow!(
                "voltage setpoint {volts} V outside 0..={} V for {:?}",
                self.profile.max_voltage,
                self.profile.model
            ));
        }
        self.write_command(&format!("VOLT {volts}")).await?;
        debug!(volts, "voltage setpoint commanded");
        Ok(())
    }

    async fn set_current(&self, amps: f64) -> Result<()> {
        if !(0.0..=self.profile.max_current).contains(&amps) {
            return Err(anyhow!(
                "current setpoint {amps} A outside 0..={} A for {:?}",
                self.profile.max_current,
                self.profile.model
            ));
        }
        self.write_command(&format!("CURR {amps}")).await?;
        debug!(amps, "current setpoint commanded");
        Ok(())
    }

    async fn read_voltage(&self) -> Result<f64> {
        let response = self.query("MEAS:VOLT?").await?;
        parse_scpi_f64(&response)
            .with_context(|| format!("parse MEAS:VOLT? response from {}", self.endpoint))
    }

    async fn read_current(&self) -> Result<f64> {
        let response = self.query("MEAS:CURR?").await?;
        parse_scpi_f64(&response)
            .with_context(|| format!("parse MEAS:CURR? response from {}", self.endpoint))
    }

    async fn enable_output(&self) -> Result<OutputTransition> {
        let state = self.query("OUTP?").await?;
        if state == "1" {
            debug!("supply output already enabled");
            return Ok(OutputTransition::AlreadyEnabled);
        }
        self.write_command("OUTP ON").await?;
        info!("supply output enabled");
        Ok(OutputTransition::Enabled)
    }

    async fn disable_output(&self) -> Result<OutputTransition> {
        let state = self.query("OUTP?").await?;
        if state == "0" {
            debug!("supply output already disabled");
            return Ok(OutputTransition::AlreadyDisabled);
        }
        self.write_command("OUTP OFF").await?;
        info!("supply output disabled");
        Ok(OutputTransition::Disabled)
    }
}

/// Parse a SCPI numeric response (plain or scientific notation, e.g.
/// `+3.70370E+01`).
fn parse_scpi_f64(response: &str) -> Result<f64> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty instrument response"));
    }
    trimmed
        .parse::<f64>()
        .with_context(|| format!("malformed instrument response: '{trimmed}'"))
}
