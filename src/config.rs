//! Configuration management.
//!
//! Settings load once at startup from `config/<name>.toml` and are never
//! mutated afterwards; endpoints and the sweep controller receive their
//! sections (or values from them) at construction.

use crate::error::CalError;
use crate::hardware::keysight::SupplyModel;
use crate::sweep::SweepSettings;
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log verbosity: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Bench power supply link.
    pub supply: SupplySettings,
    /// Cloud sensor API access.
    pub sensor: SensorSettings,
    /// Sweep parameters.
    #[serde(default)]
    pub sweep: SweepSettings,
    /// Output storage locations.
    #[serde(default)]
    pub storage: StorageSettings,
}

/// Power supply link settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SupplySettings {
    /// Instrument hostname or IP on the lab network.
    pub host: String,
    /// SCPI raw socket port (5025 on Keysight LAN instruments).
    #[serde(default = "default_scpi_port")]
    pub port: u16,
    /// Which supported supply model is on the bench.
    #[serde(default)]
    pub profile: SupplyModel,
    /// Deadline for a single SCPI query round trip.
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub query_timeout: Duration,
}

/// Cloud sensor API settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SensorSettings {
    /// Device API root, without a trailing slash.
    #[serde(default = "default_sensor_base_url")]
    pub base_url: String,
    /// Cloud device id of the measurement unit.
    pub device_id: String,
    /// API access token passed on every request.
    pub access_token: String,
    /// Deadline for establishing the HTTPS connection.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Deadline for the full request/response exchange.
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub response_timeout: Duration,
}

/// Output storage settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Directory the calibration tables are written into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_scpi_port() -> u16 {
    5025
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_sensor_base_url() -> String {
    "https://api.particle.io/v1/devices".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

impl Settings {
    /// Load settings from `config/<name>.toml`, falling back to
    /// `config/default.toml` when no name is given.
    pub fn new(config_name: Option<&str>) -> Result<Self, CalError> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));

        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(CalError::Config)?;

        s.try_deserialize().map_err(CalError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_settings_parse_human_durations() {
        let src = r#"
            device_id = "e00fce68deadbeef"
            access_token = "tok"
            connect_timeout = "5s"
            response_timeout = "20s"
        "#;
        let settings: SensorSettings = toml::from_str(src).unwrap();
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
        assert_eq!(settings.response_timeout, Duration::from_secs(20));
        assert_eq!(settings.base_url, "https://api.particle.io/v1/devices");
    }

    #[test]
    fn supply_settings_default_port_and_timeout() {
        let src = r#"host = "10.10.223.99""#;
        let settings: SupplySettings = toml::from_str(src).unwrap();
        assert_eq!(settings.port, 5025);
        assert_eq!(settings.query_timeout, Duration::from_secs(2));
        assert_eq!(settings.profile, SupplyModel::N5767a);
    }

    #[test]
    fn storage_defaults_to_data_dir() {
        let settings = StorageSettings::default();
        assert_eq!(settings.output_dir, PathBuf::from("data"));
    }
}
