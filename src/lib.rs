//! # K_se data collection core
//!
//! Acquisition and post-processing core for a spin-exchange EPR bench
//! experiment: a frequency counter and a voltmeter sample in lockstep with
//! a timed analog trigger waveform, validated readings are batched into a
//! raw CSV log and mirrored to a bounded live feed, and a deterministic
//! post-run pipeline converts the log into calibrated, outlier-scrubbed
//! measurements.
//!
//! ## Crate structure
//!
//! - **`config`**: settings loaded from TOML plus environment overrides.
//! - **`core`**: shared value types (`Sample`, `ProcessedRecord`, the
//!   metal/energy enums, raw-log layouts, the overflow sentinel).
//! - **`instrument`**: the boundary traits real drivers plug into, the
//!   SCPI vocabulary, and deterministic mocks for tests and demos.
//! - **`trigger`**: the high/low pulse controller and its timestamp rules.
//! - **`error_policy`**: the consecutive-failure shutdown counter.
//! - **`storage`**: batched raw-log persistence with partial-flush-on-stop.
//! - **`feed`**: the bounded live display publisher.
//! - **`acquisition`**: the worker-thread loop tying the above together.
//! - **`processing`**: the pure post-run conversion pipeline.
//! - **`error`**: the crate-wide `DaqError` taxonomy.
//!
//! Instrument drivers themselves are external collaborators: anything that
//! can `write`/`query` text commands fits behind
//! [`instrument::InstrumentSession`].

pub mod acquisition;
pub mod config;
pub mod core;
pub mod error;
pub mod error_policy;
pub mod feed;
pub mod instrument;
pub mod processing;
pub mod storage;
pub mod trigger;

pub use error::{DaqError, Result};
