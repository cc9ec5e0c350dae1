//! Per-cycle telemetry records and the CSV log sink.
//!
//! The file is opened in append mode for every record, so each completed
//! cycle's row survives a later crash. Field order and decimal precision
//! are fixed for compatibility with downstream analysis tooling.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use eyre::WrapErr;

use crate::error::Result;

pub const CSV_HEADER: [&str; 6] = [
    "elapsed_s",
    "vbat_v",
    "current_raw_a",
    "current_a",
    "capacity_mah",
    "scale_factor",
];

/// One measurement cycle as written to the log sink.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementRecord {
    pub elapsed_s: f64,
    pub vbat_v: f64,
    /// Filtered, zero-subtracted current before the scale factor.
    pub current_raw_a: f64,
    /// Scale-corrected, dead-zone-clamped current.
    pub current_a: f64,
    pub capacity_mah: f64,
    pub scale_factor: f64,
}

impl MeasurementRecord {
    /// Fixed decimal formatting per field.
    pub fn csv_fields(&self) -> [String; 6] {
        [
            format!("{:.1}", self.elapsed_s),
            format!("{:.3}", self.vbat_v),
            format!("{:.6}", self.current_raw_a),
            format!("{:.3}", self.current_a),
            format!("{:.2}", self.capacity_mah),
            format!("{:.6}", self.scale_factor),
        ]
    }
}

pub trait CycleLog {
    fn record(&mut self, rec: &MeasurementRecord) -> Result<()>;
}

/// Append-only CSV sink; writes the header when creating the file.
pub struct CsvCycleLog {
    path: PathBuf,
}

impl CsvCycleLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CycleLog for CsvCycleLog {
    fn record(&mut self, rec: &MeasurementRecord) -> Result<()> {
        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .wrap_err("open telemetry log")?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if write_header {
            wtr.write_record(CSV_HEADER)?;
        }
        wtr.write_record(rec.csv_fields())?;
        wtr.flush().wrap_err("flush telemetry log")?;
        Ok(())
    }
}

/// In-memory sink for tests; clones share the same row store.
#[derive(Default, Clone)]
pub struct MemoryLog {
    rows: Arc<Mutex<Vec<MeasurementRecord>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<MeasurementRecord> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl CycleLog for MemoryLog {
    fn record(&mut self, rec: &MeasurementRecord) -> Result<()> {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(*rec);
        }
        Ok(())
    }
}
