//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, used across the
//! crate. The taxonomy matters for the acquisition loop:
//!
//! - **`Instrument`**: a single write/query against an instrument session
//!   failed. These are transient from the loop's point of view and are fed
//!   to the consecutive-failure policy rather than propagated mid-run.
//! - **`MalformedRecord`**: a raw-log field could not be parsed during
//!   post-processing. Fatal to that processing call only; it never affects
//!   a collection run that already completed.
//! - **`Config` / `Configuration`**: file-level parse failures vs. semantic
//!   problems (a zero dwell time, an empty instrument address) caught during
//!   validation.
//!
//! Overflow readings from the hardware are deliberately *not* an error
//! variant: they are valid replies carrying a sentinel value and are handled
//! inline by the acquisition loop and the processing filters.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type Result<T> = std::result::Result<T, DaqError>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Error loading or parsing a configuration file.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Semantically invalid configuration value.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying file or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding or decoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A write or query against an instrument session failed.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// A raw-log field could not be parsed as a number.
    #[error("Malformed raw record at row {row}: {message}")]
    MalformedRecord {
        /// Zero-based data row index (header excluded).
        row: usize,
        /// Description of the offending field.
        message: String,
    },

    /// Error in a data-processing stage.
    #[error("Data processing error: {0}")]
    Processing(String),
}

impl DaqError {
    /// Builds an instrument error from any displayable driver failure.
    pub fn instrument(err: impl std::fmt::Display) -> Self {
        DaqError::Instrument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_reports_row() {
        let err = DaqError::MalformedRecord {
            row: 4,
            message: "bad frequency 'abc'".into(),
        };
        let text = err.to_string();
        assert!(text.contains("row 4"));
        assert!(text.contains("bad frequency"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DaqError = io.into();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
