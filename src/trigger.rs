//! Trigger waveform controller.
//!
//! One trigger cycle asserts the analog output high, dwells, drops it low,
//! and dwells again. Both instruments sample on the rising edge, so the
//! cycle's timestamp is captured immediately after the high-level write —
//! not after the dwells — and downstream elapsed-time values rely on that.

use crate::error::Result;
use crate::instrument::AnalogOutput;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, matching the raw-log format.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// High/low pulse parameters for one trigger cycle.
#[derive(Debug, Clone, Copy)]
pub struct TriggerCycle {
    /// Asserted level in volts.
    pub high_level_v: f64,
    /// Idle level in volts.
    pub low_level_v: f64,
    /// Dwell at the asserted level.
    pub high_dwell: Duration,
    /// Dwell at the idle level.
    pub low_dwell: Duration,
}

impl TriggerCycle {
    /// Runs one high-then-low pulse on `output` and returns the epoch
    /// timestamp of trigger assertion.
    ///
    /// Blocks for `high_dwell + low_dwell`. Each cycle's real duration is
    /// that plus fetch and processing overhead; the cadence drifts
    /// accordingly and is deliberately not compensated.
    pub fn run(&self, output: &mut dyn AnalogOutput) -> Result<f64> {
        output.write(self.high_level_v)?;
        let t1 = epoch_seconds();
        thread::sleep(self.high_dwell);
        output.write(self.low_level_v)?;
        thread::sleep(self.low_dwell);
        Ok(t1)
    }

    /// Nominal duration of one cycle, excluding overhead.
    pub fn period(&self) -> Duration {
        self.high_dwell + self.low_dwell
    }
}
