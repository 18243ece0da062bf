//! Configuration management.
//!
//! Settings are loaded from a TOML file via the `config` crate, with
//! `KSE_`-prefixed environment variables overriding individual fields.
//! Values are supplied externally and never re-derived; `validate` catches
//! semantic problems (zero dwell times, empty addresses) before any
//! instrument is touched.

use crate::core::{EnergyLevel, Metal};
use crate::error::{DaqError, Result};
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Folder where raw and processed CSV files are written.
    pub output_folder: PathBuf,
    /// VISA-style address of the frequency counter.
    pub keysight_addr: String,
    /// Address of the digital multimeter.
    pub dmm_addr: String,
    /// Analog-output channel identifier (e.g. `Dev2/ao0`).
    pub ao_channel: String,
    /// Trigger waveform levels and dwell times.
    #[serde(default)]
    pub trigger: TriggerSettings,
    /// Number of samples accumulated before each CSV append.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive fetch failures tolerated before shutdown.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Alkali metal used for calibration.
    pub metal: Metal,
    /// Energy level used for calibration.
    pub energy_level: EnergyLevel,
}

/// Trigger waveform parameters.
///
/// The defaults give a ~0.8 s cadence per point once the per-cycle
/// initialization pulse is included.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TriggerSettings {
    /// Asserted trigger level in volts. Stay below 5 V.
    pub high_level_v: f64,
    /// Idle trigger level in volts.
    pub low_level_v: f64,
    /// Seconds to hold the asserted level.
    pub high_dwell_s: f64,
    /// Seconds to hold the idle level.
    pub low_dwell_s: f64,
    /// Dwell on each edge of the short flush pulse issued before every cycle.
    pub flush_dwell_s: f64,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            high_level_v: 2.0,
            low_level_v: 0.0,
            high_dwell_s: 0.1,
            low_dwell_s: 0.7,
            flush_dwell_s: 0.05,
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_error_threshold() -> u32 {
    3
}

impl Settings {
    /// Loads settings from `config/<name>.toml` (default `config/default`),
    /// with `KSE_*` environment variables taking precedence.
    pub fn new(config_name: Option<&str>) -> Result<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .add_source(config::Environment::with_prefix("KSE"))
            .build()
            .map_err(DaqError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(DaqError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a TOML string. Used by tests and embedding callers.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .map_err(DaqError::Config)?;
        let settings: Settings = s.try_deserialize().map_err(DaqError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks semantic constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.trigger.high_dwell_s <= 0.0 || self.trigger.low_dwell_s <= 0.0 {
            return Err(DaqError::Configuration(
                "trigger dwell times must be positive".into(),
            ));
        }
        if self.trigger.flush_dwell_s < 0.0 {
            return Err(DaqError::Configuration(
                "flush pulse dwell must not be negative".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(DaqError::Configuration("batch_size must be at least 1".into()));
        }
        if self.error_threshold == 0 {
            return Err(DaqError::Configuration(
                "error_threshold must be at least 1".into(),
            ));
        }
        if self.keysight_addr.is_empty() || self.dmm_addr.is_empty() {
            return Err(DaqError::Configuration(
                "instrument addresses must not be empty".into(),
            ));
        }
        if self.ao_channel.is_empty() {
            return Err(DaqError::Configuration(
                "analog output channel must not be empty".into(),
            ));
        }
        Ok(())
    }
}
