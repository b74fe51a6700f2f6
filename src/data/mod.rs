//! Sample accumulation and storage modules.

pub mod samples;
pub mod storage;

pub use samples::{current_header, voltage_header, Sample, SampleStore};
pub use storage::CsvExporter;
