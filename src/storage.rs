//! Raw-log persistence.
//!
//! Samples are appended to a CSV log in batches: a row per point costs a
//! disk touch that is expensive next to the ~0.8 s cadence budget, so the
//! acquisition loop accumulates `batch_size` samples per append and the
//! writer flushes the file before each append returns. The final partial
//! batch is flushed by the shutdown path, so no buffered sample is
//! silently dropped.

use crate::core::{RawLayout, Sample};
use crate::error::Result;
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Header row of the real-time raw layout.
pub const REALTIME_HEADER: [&str; 3] = ["Frequencies", "Voltages", "Time Interval"];
/// Header row of the batched raw layout.
pub const BATCHED_HEADER: [&str; 4] = ["Frequencies", "Voltages", "Times", "Timestamps"];
/// Header row of the processed output file.
pub const PROCESSED_HEADER: [&str; 4] = ["Time", "Keysight", "DMM", "Adjusted Keysight Data"];

/// Appends validated samples to a raw CSV log in ordered batches.
pub struct RawLogWriter {
    path: PathBuf,
    layout: RawLayout,
    writer: Option<csv::Writer<File>>,
    batches_written: usize,
    rows_written: usize,
}

impl RawLogWriter {
    /// Creates the log file and writes the layout's header row once.
    pub fn create(path: impl AsRef<Path>, layout: RawLayout) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::Writer::from_path(&path)?;
        match layout {
            RawLayout::RealTime => writer.write_record(REALTIME_HEADER)?,
            RawLayout::Batched => writer.write_record(BATCHED_HEADER)?,
        }
        writer.flush()?;
        log::info!("raw log created at {}", path.display());
        Ok(Self {
            path,
            layout,
            writer: Some(writer),
            batches_written: 0,
            rows_written: 0,
        })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row per sample, in order, and flushes the file.
    ///
    /// The header is never rewritten. Calling with an empty slice is a
    /// no-op and does not count as a batch.
    pub fn append_batch(&mut self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let Some(writer) = self.writer.as_mut() else {
            return Err(crate::error::DaqError::Processing(
                "append after raw log close".into(),
            ));
        };
        for sample in samples {
            match self.layout {
                RawLayout::RealTime => writer.write_record(&[
                    sample.frequency_hz.to_string(),
                    sample.voltage_v.to_string(),
                    sample.elapsed_s.to_string(),
                ])?,
                RawLayout::Batched => {
                    let human = chrono::DateTime::from_timestamp(
                        sample.timestamp as i64,
                        (sample.timestamp.fract() * 1e9) as u32,
                    )
                    .map(|dt| dt.with_timezone(&Local).format("%H:%M:%S%.6f").to_string())
                    .unwrap_or_default();
                    writer.write_record(&[
                        sample.frequency_hz.to_string(),
                        sample.voltage_v.to_string(),
                        human,
                        sample.timestamp.to_string(),
                    ])?;
                }
            }
        }
        writer.flush()?;
        self.batches_written += 1;
        self.rows_written += samples.len();
        log::debug!(
            "appended batch of {} ({} rows total)",
            samples.len(),
            self.rows_written
        );
        Ok(())
    }

    /// Number of non-empty batches appended so far.
    pub fn batches_written(&self) -> usize {
        self.batches_written
    }

    /// Number of sample rows appended so far.
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Flushes and releases the file. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            log::info!("raw log closed ({} rows)", self.rows_written);
        }
        Ok(())
    }
}

impl Drop for RawLogWriter {
    fn drop(&mut self) {
        // Close path already ran in the normal case; this only catches
        // abandonment without close.
        let _ = self.close();
    }
}

/// Filename stem for a new collection run, derived from the local wall
/// clock with characters unusable on Windows replaced.
pub fn timestamped_filename() -> String {
    format!("{}.csv", Local::now().format("%Y-%m-%d-%H_%M_%S%.6f"))
}

/// Sibling path for the processed output of `raw_path`
/// (`<name>.csv` becomes `<name>_processed.csv`).
pub fn processed_path(raw_path: &Path) -> PathBuf {
    let stem = raw_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.csv");
    let stem = stem.strip_suffix(".csv").unwrap_or(stem);
    raw_path.with_file_name(format!("{stem}_processed.csv"))
}
