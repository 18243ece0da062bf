//! Core data types shared across acquisition and processing.

use serde::{Deserialize, Serialize};

/// Hardware sentinel: readings at or above this magnitude are invalid
/// (the instrument reports an out-of-range condition as ~9.9e37, but both
/// the Keysight and the Keithley use values far beyond 1e11 for it, which
/// no physical reading in this experiment approaches).
pub const OVERFLOW_SENTINEL: f64 = 1e11;

/// Returns true when a fetched reading carries the overflow sentinel.
pub fn is_overflow(value: f64) -> bool {
    value >= OVERFLOW_SENTINEL
}

/// One validated reading pair captured during a trigger cycle.
///
/// Immutable once constructed; produced exactly once per successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time of trigger assertion, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Frequency counter reading in Hz.
    pub frequency_hz: f64,
    /// Voltmeter reading in V.
    pub voltage_v: f64,
    /// Seconds since the first cycle of the run.
    pub elapsed_s: f64,
}

/// One row of the processed output file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// Seconds since the start of the run.
    pub time: f64,
    /// Raw frequency counter reading in Hz.
    pub keysight: f64,
    /// Voltmeter reading converted to an equivalent frequency shift in Hz.
    pub dmm: f64,
    /// `keysight - dmm`, the field-drift-corrected frequency in Hz.
    pub adjusted_keysight: f64,
}

/// Alkali metal species in the vapor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Metal {
    /// Rubidium-85.
    Rb85,
    /// Rubidium-87.
    Rb87,
    /// Cesium-133.
    Cs133,
}

/// Hyperfine energy level the measurement addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    /// Upper hyperfine level.
    High,
    /// Lower hyperfine level.
    Low,
}

/// Layout of a raw log file.
///
/// The two layouts are not interchangeable: the batched layout stores
/// absolute epoch timestamps (elapsed time must be derived), while the
/// real-time layout stores elapsed seconds directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RawLayout {
    /// `Frequencies,Voltages,Times,Timestamps` with absolute timestamps.
    Batched,
    /// `Frequencies,Voltages,Time Interval` with elapsed seconds.
    RealTime,
}
