//! Calibration sample accumulation.
//!
//! Samples land here in sweep order as each step completes; export happens
//! separately, after the run, so an aborted sweep keeps everything it
//! recorded.

/// One recorded calibration row: the swept reference value and the
/// per-channel measurements reported for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Reference value commanded on the supply (pre-mapping for current
    /// sweeps).
    pub reference: f64,
    /// Raw per-channel measured values, in channel order.
    pub measured: Vec<String>,
}

impl Sample {
    /// Create a sample; the measured values keep the sensor's formatting.
    pub fn new(reference: f64, measured: Vec<String>) -> Self {
        Self { reference, measured }
    }
}

/// Append-only accumulation of the voltage and current calibration tables.
#[derive(Debug, Default)]
pub struct SampleStore {
    voltages: Vec<Sample>,
    currents: Vec<Sample>,
}

impl SampleStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one voltage-table row.
    pub fn append_voltage_sample(&mut self, sample: Sample) {
        self.voltages.push(sample);
    }

    /// Append one current-table row.
    pub fn append_current_sample(&mut self, sample: Sample) {
        self.currents.push(sample);
    }

    /// Recorded voltage rows, in sweep order.
    pub fn voltage_samples(&self) -> &[Sample] {
        &self.voltages
    }

    /// Recorded current rows, in sweep order.
    pub fn current_samples(&self) -> &[Sample] {
        &self.currents
    }

    /// Rows in the voltage table.
    pub fn voltage_row_count(&self) -> usize {
        self.voltages.len()
    }

    /// Rows in the current table.
    pub fn current_row_count(&self) -> usize {
        self.currents.len()
    }

    /// Columns in the voltage table (reference plus one per channel), 0
    /// while the table is empty.
    pub fn voltage_column_count(&self) -> usize {
        self.voltages.first().map_or(0, |s| 1 + s.measured.len())
    }

    /// Columns in the current table, 0 while the table is empty.
    pub fn current_column_count(&self) -> usize {
        self.currents.first().map_or(0, |s| 1 + s.measured.len())
    }

    /// Discard every recorded sample.
    pub fn reset(&mut self) {
        self.voltages.clear();
        self.currents.clear();
    }
}

/// Header row for a voltage table covering `channels` inverter boards.
pub fn voltage_header(channels: usize) -> Vec<String> {
    let mut header = Vec::with_capacity(channels + 1);
    header.push("PSU Reference Voltage".to_string());
    for channel in 1..=channels {
        header.push(format!("Inverter {channel} Voltage(V)"));
    }
    header
}

/// Header row for a current table covering `channels` inverter boards.
pub fn current_header(channels: usize) -> Vec<String> {
    let mut header = Vec::with_capacity(channels + 1);
    header.push("PSU Reference Current".to_string());
    for channel in 1..=channels {
        header.push(format!("Inverter {channel} Current(A)"));
    }
    header
}
