//! Custom error types for the application.
//!
//! This module defines the primary error type, [`CalError`], used across the
//! calibration stack. Fault classes map to variants so callers can tell a
//! dead instrument link from a cloud API failure or a bad sweep definition,
//! and the standard `std::io` / `config` error types convert into it
//! automatically.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, CalError>;

/// Central error type for the calibration application.
#[derive(Error, Debug)]
pub enum CalError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Power supply connection error: {0}")]
    Connection(String),

    #[error("Sensor error: {0}")]
    Sensor(String),

    #[error("Sweep sequence error: {0}")]
    Sequence(String),

    #[error("Operation '{operation}' failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts_into_cal_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: CalError = io_err.into();
        assert!(matches!(err, CalError::Io(_)));
    }

    #[test]
    fn retry_exhausted_display_names_operation_and_count() {
        let err = CalError::RetryExhausted {
            operation: "calibration step".to_string(),
            attempts: 3,
            last_error: "sensor timed out".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("calibration step"));
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("sensor timed out"));
    }

    #[test]
    fn sequence_error_display() {
        let err = CalError::Sequence("increment must be positive, got 0".to_string());
        assert!(err.to_string().starts_with("Sweep sequence error:"));
    }
}
