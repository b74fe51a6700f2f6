//! # Inverter Calibration Library
//!
//! Core library for the `inverter_cal` application. It drives a
//! programmable bench power supply through voltage and current sweeps over
//! its LAN control link, reads the inverter boards' own measurements back
//! through the device cloud, and accumulates paired reference/measured
//! samples for CSV export.
//!
//! ## Crate Structure
//!
//! - **`config`**: TOML-backed [`config::Settings`] describing the supply
//!   link, the cloud sensor, the sweep parameters, and storage paths.
//! - **`error`**: the central [`error::CalError`] type and `AppResult`.
//! - **`hardware`**: capability traits for the two endpoints, the
//!   SCPI-over-TCP supply driver, the cloud sensor driver, and mocks.
//! - **`sweep`**: setpoint sequence generation, the bounded retry policy,
//!   and the sweep run state machine.
//! - **`data`**: sample accumulation and CSV export.
//! - **`tracing_setup`**: structured logging initialization.

pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod sweep;
pub mod tracing_setup;
