//! Instrument boundary traits and SCPI command vocabulary.
//!
//! The acquisition core consumes instruments through two small capability
//! traits rather than owning driver implementations. Real deployments wrap
//! a VISA or GPIB driver session behind [`InstrumentSession`] and an
//! NI-DAQ analog-output task behind [`AnalogOutput`]; the bundled mocks in
//! [`mock`] implement the same traits for tests and the demo binary.
//!
//! # Contract
//!
//! - All methods block. Sessions are **not** safe for concurrent callers;
//!   the acquisition worker is the only thread allowed to touch them.
//! - `write` has no return payload; `query` returns the instrument's raw
//!   textual reply or fails.
//! - Nothing beyond that is assumed: the core never validates that a device
//!   actually supports the issued commands.

use crate::error::Result;

pub mod mock;

/// Duplex command channel to one bench instrument.
pub trait InstrumentSession: Send {
    /// Sends a command with no reply expected.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Sends a command and returns the raw textual reply.
    fn query(&mut self, command: &str) -> Result<String>;

    /// Releases the session. Must tolerate repeated calls.
    fn close(&mut self) -> Result<()>;
}

/// DC analog-output channel used to drive the trigger waveform.
pub trait AnalogOutput: Send {
    /// Arms the output channel. Call once before the first `write`.
    fn start(&mut self) -> Result<()>;

    /// Sets the output to the given DC level immediately.
    fn write(&mut self, level: f64) -> Result<()>;

    /// Releases the channel. Must tolerate repeated calls.
    fn close(&mut self) -> Result<()>;
}

/// SCPI commands issued by the acquisition loop.
///
/// These mirror the initialization sequence the bench procedure requires:
/// reset and clear both instruments, put the counter in frequency mode with
/// an external positive-slope trigger, and take exactly one sample per
/// trigger on the meter.
pub mod scpi {
    /// Full instrument reset.
    pub const RESET: &str = "*RST";
    /// Preset the status registers.
    pub const STATUS_PRESET: &str = "STAT:PRES";
    /// Clear the event queues.
    pub const CLEAR_STATUS: &str = "*CLS";
    /// Configure the counter for frequency measurement.
    pub const CONFIGURE_FREQUENCY: &str = "CONF:FREQ";
    /// Trigger on the rising edge.
    pub const TRIGGER_SLOPE_POSITIVE: &str = "TRIG:SLOP POS";
    /// One sample per trigger.
    pub const SAMPLE_COUNT_ONE: &str = "SAMP:COUN 1";
    /// Arm for the next trigger.
    pub const INITIATE: &str = "INIT";
    /// Fetch the buffered reading.
    pub const FETCH: &str = "FETC?";
    /// Read and remove the pending reading from the data register.
    pub const READ_REGISTER: &str = "R?";

    /// Builds a `TRIG:SOUR` command for the given source (e.g. `EXT`).
    pub fn trigger_source(source: &str) -> String {
        format!("TRIG:SOUR {source}")
    }

    /// Builds a `TRIG:COUN` command for the given trigger count.
    pub fn trigger_count(count: u32) -> String {
        format!("TRIG:COUN {count}")
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn command_builders() {
            assert_eq!(trigger_source("EXT"), "TRIG:SOUR EXT");
            assert_eq!(trigger_count(1), "TRIG:COUN 1");
        }
    }
}
