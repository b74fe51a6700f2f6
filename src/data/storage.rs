//! Calibration table export.
//!
//! Writes the accumulated tables as two CSV files,
//! `calibration_voltages.csv` and `calibration_currents.csv`, each with a
//! header row sized to the number of reporting inverter boards. Gated
//! behind the `storage_csv` feature (on by default).

use crate::data::samples::SampleStore;
use crate::error::CalError;
use std::path::{Path, PathBuf};

#[cfg(feature = "storage_csv")]
use crate::data::samples::{current_header, voltage_header, Sample};
#[cfg(feature = "storage_csv")]
use std::fs::File;
#[cfg(feature = "storage_csv")]
use tracing::info;

/// Writes the accumulated calibration tables as CSV files.
#[cfg(feature = "storage_csv")]
pub struct CsvExporter {
    output_dir: PathBuf,
}

#[cfg(feature = "storage_csv")]
impl CsvExporter {
    /// Exporter writing into `output_dir`, created on first export.
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Write both calibration tables and return their paths.
    ///
    /// `channels` sizes the header rows, so a table with no samples still
    /// gets its header. Cell values are written exactly as recorded: the
    /// reference as the number's plain text form, measurements as the raw
    /// sensor tokens.
    pub fn export(
        &self,
        store: &SampleStore,
        channels: usize,
    ) -> Result<(PathBuf, PathBuf), CalError> {
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir)?;
        }

        let voltages_path = self.output_dir.join("calibration_voltages.csv");
        write_table(&voltages_path, &voltage_header(channels), store.voltage_samples())?;

        let currents_path = self.output_dir.join("calibration_currents.csv");
        write_table(&currents_path, &current_header(channels), store.current_samples())?;

        info!(
            voltage_rows = store.voltage_row_count(),
            current_rows = store.current_row_count(),
            dir = %self.output_dir.display(),
            "calibration tables exported"
        );
        Ok((voltages_path, currents_path))
    }
}

#[cfg(feature = "storage_csv")]
fn write_table(path: &Path, header: &[String], samples: &[Sample]) -> Result<(), CalError> {
    let file = File::create(path)
        .map_err(|e| CalError::Storage(format!("Failed to create {}: {e}", path.display())))?;
    let mut writer = csv::Writer::from_writer(file);

    writer
        .write_record(header)
        .map_err(|e| CalError::Storage(e.to_string()))?;

    for sample in samples {
        let mut record = Vec::with_capacity(1 + sample.measured.len());
        record.push(sample.reference.to_string());
        record.extend(sample.measured.iter().cloned());
        writer
            .write_record(&record)
            .map_err(|e| CalError::Storage(e.to_string()))?;
    }

    writer
        .flush()
        .map_err(|e| CalError::Storage(e.to_string()))?;
    Ok(())
}

/// Stub used when the crate is built without `storage_csv`.
#[cfg(not(feature = "storage_csv"))]
pub struct CsvExporter;

#[cfg(not(feature = "storage_csv"))]
impl CsvExporter {
    /// Exporter stub; `output_dir` is ignored.
    pub fn new(_output_dir: &Path) -> Self {
        Self
    }

    /// Always fails: CSV export requires the `storage_csv` feature.
    pub fn export(
        &self,
        _store: &SampleStore,
        _channels: usize,
    ) -> Result<(PathBuf, PathBuf), CalError> {
        Err(CalError::FeatureNotEnabled("storage_csv".to_string()))
    }
}

#[cfg(all(test, feature = "storage_csv"))]
mod tests {
    use super::*;

    fn sample(reference: f64, values: &[&str]) -> Sample {
        Sample::new(reference, values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn export_writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SampleStore::new();
        store.append_voltage_sample(sample(0.0, &["1.20", "1.19", "1.21"]));
        store.append_voltage_sample(sample(1.0, &["2.31", "2.30", "2.33"]));

        let exporter = CsvExporter::new(dir.path());
        let (voltages_path, currents_path) = exporter.export(&store, 3).unwrap();

        let voltages = std::fs::read_to_string(&voltages_path).unwrap();
        let mut lines = voltages.lines();
        assert_eq!(
            lines.next().unwrap(),
            "PSU Reference Voltage,Inverter 1 Voltage(V),Inverter 2 Voltage(V),Inverter 3 Voltage(V)"
        );
        assert_eq!(lines.next().unwrap(), "0,1.20,1.19,1.21");
        assert_eq!(lines.next().unwrap(), "1,2.31,2.30,2.33");
        assert_eq!(lines.next(), None);

        // The untouched current table still gets its header.
        let currents = std::fs::read_to_string(&currents_path).unwrap();
        assert_eq!(
            currents.trim_end(),
            "PSU Reference Current,Inverter 1 Current(A),Inverter 2 Current(A),Inverter 3 Current(A)"
        );
    }

    #[test]
    fn export_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("today");

        let exporter = CsvExporter::new(&nested);
        exporter.export(&SampleStore::new(), 1).unwrap();
        assert!(nested.join("calibration_voltages.csv").exists());
    }

    #[test]
    fn mapped_references_keep_their_precision() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SampleStore::new();
        store.append_current_sample(sample(0.5, &["0.49"]));
        store.append_current_sample(sample(10.0, &["9.96"]));

        let exporter = CsvExporter::new(dir.path());
        let (_, currents_path) = exporter.export(&store, 1).unwrap();

        let currents = std::fs::read_to_string(currents_path).unwrap();
        assert!(currents.contains("0.5,0.49"));
        assert!(currents.contains("10,9.96"));
    }
}
