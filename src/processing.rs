//! Post-run conversion pipeline.
//!
//! Pure functions over a finished raw log: parse the text columns, convert
//! voltmeter readings to an equivalent frequency shift through the
//! metal/energy-dependent conversion factor, subtract that shift from the
//! counter readings, and emit processed records. Fully re-entrant; nothing
//! here touches acquisition state.
//!
//! Physics: the voltmeter watches a field-proportional monitor output, so a
//! change in voltage relative to the first reading maps through the
//! magnetometer scale constants and the species' gyromagnetic ratio to a
//! frequency offset the counter would have seen from field drift alone.

use crate::core::{EnergyLevel, Metal, ProcessedRecord, RawLayout, OVERFLOW_SENTINEL};
use crate::error::{DaqError, Result};
use crate::storage::PROCESSED_HEADER;
use std::path::Path;

/// Gyromagnetic ratios in Hz/Gauss, upper hyperfine level.
pub const RB87_GYROMAGNETIC_HE: f64 = -687_948.167;
/// Rb-85, upper hyperfine level.
pub const RB85_GYROMAGNETIC_HE: f64 = -447_338.733;
/// Cs-133, upper hyperfine level.
pub const CS133_GYROMAGNETIC_HE: f64 = -344_814.813;
/// Rb-87, lower hyperfine level.
pub const RB87_GYROMAGNETIC_LE: f64 = -711_218.443;
/// Rb-85, lower hyperfine level.
pub const RB85_GYROMAGNETIC_LE: f64 = -486_146.856;
/// Cs-133, lower hyperfine level.
pub const CS133_GYROMAGNETIC_LE: f64 = -354_909.377;

/// Magnetometer monitor-output voltage scale in volts.
pub const CONVERSION_VOLTS: f64 = 0.1;
/// Magnetometer field scale in Gauss.
pub const CONVERSION_GAUSS: f64 = 0.01;
/// Field coil gain.
pub const FIELD_GAIN: f64 = 1.0 / 100.0;

/// Signed gyromagnetic ratio for the given species and energy level.
pub fn gyromagnetic_ratio(metal: Metal, energy: EnergyLevel) -> f64 {
    match (metal, energy) {
        (Metal::Rb87, EnergyLevel::High) => RB87_GYROMAGNETIC_HE,
        (Metal::Rb85, EnergyLevel::High) => RB85_GYROMAGNETIC_HE,
        (Metal::Cs133, EnergyLevel::High) => CS133_GYROMAGNETIC_HE,
        (Metal::Rb87, EnergyLevel::Low) => RB87_GYROMAGNETIC_LE,
        (Metal::Rb85, EnergyLevel::Low) => RB85_GYROMAGNETIC_LE,
        (Metal::Cs133, EnergyLevel::Low) => CS133_GYROMAGNETIC_LE,
    }
}

/// Gauss-per-volt conversion for the magnetometer monitor output.
pub fn magnetometer_factor(volts: f64, gauss: f64, gain: f64) -> f64 {
    (gauss / volts) * gain
}

/// Overall volts-to-Hz conversion factor for the given species and level.
pub fn conversion_factor(metal: Metal, energy: EnergyLevel) -> f64 {
    magnetometer_factor(CONVERSION_VOLTS, CONVERSION_GAUSS, FIELD_GAIN)
        * gyromagnetic_ratio(metal, energy)
}

/// Converts voltmeter readings to equivalent frequency shifts in Hz.
///
/// The first reading is the reference point: `dmm[i] = (v[i] - v[0]) * cf`,
/// so `dmm[0]` is zero by construction.
pub fn dmm_frequencies(voltages: &[f64], metal: Metal, energy: EnergyLevel) -> Vec<f64> {
    let cf = conversion_factor(metal, energy);
    let initial = voltages.first().copied().unwrap_or(0.0);
    voltages.iter().map(|v| (v - initial) * cf).collect()
}

/// Subtracts the field-drift frequency from each counter reading.
pub fn adjust_keysight(keysight: &[f64], dmm: &[f64]) -> Vec<f64> {
    keysight.iter().zip(dmm).map(|(k, d)| k - d).collect()
}

/// Rebases absolute timestamps to elapsed seconds from the first row.
pub fn elapsed_from_timestamps(timestamps: &[f64]) -> Vec<f64> {
    let origin = timestamps.first().copied().unwrap_or(0.0);
    timestamps.iter().map(|t| t - origin).collect()
}

/// Raw-log columns as text, header stripped; numeric parsing is deferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumns {
    /// Frequency counter readings.
    pub frequencies: Vec<String>,
    /// Voltmeter readings.
    pub voltages: Vec<String>,
    /// Elapsed seconds (real-time layout) or absolute epoch timestamps
    /// (batched layout).
    pub times: Vec<String>,
}

/// Named raw-log column an overflow filter can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawColumn {
    /// The `Frequencies` column.
    Frequencies,
    /// The `Voltages` column.
    Voltages,
}

impl RawColumns {
    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    /// Whether the log holds no data rows.
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    fn column(&self, column: RawColumn) -> &[String] {
        match column {
            RawColumn::Frequencies => &self.frequencies,
            RawColumn::Voltages => &self.voltages,
        }
    }

    /// Removes the rows at the given sorted indices from all columns.
    fn remove_rows(&mut self, indices: &[usize]) {
        for &i in indices.iter().rev() {
            self.frequencies.remove(i);
            self.voltages.remove(i);
            self.times.remove(i);
        }
    }
}

/// Reads the three data columns of a raw log, skipping the header row.
///
/// Column positions differ by layout: batched logs carry a human-readable
/// time column between the voltages and the timestamps.
pub fn read_raw_columns(path: impl AsRef<Path>, layout: RawLayout) -> Result<RawColumns> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path.as_ref())?;

    let time_index = match layout {
        RawLayout::RealTime => 2,
        RawLayout::Batched => 3,
    };

    let mut columns = RawColumns {
        frequencies: Vec::new(),
        voltages: Vec::new(),
        times: Vec::new(),
    };
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |index: usize| -> Result<String> {
            record
                .get(index)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| DaqError::MalformedRecord {
                    row,
                    message: format!("missing column {index}"),
                })
        };
        columns.frequencies.push(field(0)?);
        columns.voltages.push(field(1)?);
        columns.times.push(field(time_index)?);
    }
    Ok(columns)
}

/// Parses one text column to numbers, reporting the offending row on failure.
pub fn parse_column(values: &[String], name: &str) -> Result<Vec<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            value.parse::<f64>().map_err(|_| DaqError::MalformedRecord {
                row,
                message: format!("{name} value {value:?} is not a number"),
            })
        })
        .collect()
}

/// Indices of values strictly above `threshold`.
pub fn find_overflow(values: &[f64], threshold: f64) -> Vec<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Removes rows whose value in `column` exceeds the overflow sentinel.
///
/// Standalone and idempotent: applying it twice removes nothing new.
/// Returns the number of rows removed.
pub fn remove_overflow_rows(columns: &mut RawColumns, column: RawColumn) -> Result<usize> {
    let name = match column {
        RawColumn::Frequencies => "frequency",
        RawColumn::Voltages => "voltage",
    };
    let parsed = parse_column(columns.column(column), name)?;
    let indices = find_overflow(&parsed, OVERFLOW_SENTINEL);
    columns.remove_rows(&indices);
    Ok(indices.len())
}

/// Runs the full conversion pipeline over a raw log.
///
/// Parsing failures are fatal to this call only; a completed collection
/// run is never affected.
pub fn process(
    path: impl AsRef<Path>,
    metal: Metal,
    energy: EnergyLevel,
    layout: RawLayout,
) -> Result<Vec<ProcessedRecord>> {
    let columns = read_raw_columns(path, layout)?;
    process_columns(&columns, metal, energy, layout)
}

/// Conversion pipeline over already-loaded columns. Lets callers scrub
/// overflow rows first without re-reading the file.
pub fn process_columns(
    columns: &RawColumns,
    metal: Metal,
    energy: EnergyLevel,
    layout: RawLayout,
) -> Result<Vec<ProcessedRecord>> {
    let keysight = parse_column(&columns.frequencies, "frequency")?;
    let voltages = parse_column(&columns.voltages, "voltage")?;
    let times = parse_column(&columns.times, "time")?;

    let dmm = dmm_frequencies(&voltages, metal, energy);
    let adjusted = adjust_keysight(&keysight, &dmm);
    let elapsed = match layout {
        // Batched logs store absolute timestamps; rebase to the first row.
        RawLayout::Batched => elapsed_from_timestamps(&times),
        // Real-time logs already store elapsed seconds.
        RawLayout::RealTime => times,
    };

    Ok(elapsed
        .into_iter()
        .zip(keysight)
        .zip(dmm)
        .zip(adjusted)
        .map(|(((time, keysight), dmm), adjusted_keysight)| ProcessedRecord {
            time,
            keysight,
            dmm,
            adjusted_keysight,
        })
        .collect())
}

/// Writes processed records with the `Time,Keysight,DMM,...` header.
pub fn write_processed(path: impl AsRef<Path>, records: &[ProcessedRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(PROCESSED_HEADER)?;
    for record in records {
        writer.write_record(&[
            record.time.to_string(),
            record.keysight.to_string(),
            record.dmm.to_string(),
            record.adjusted_keysight.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Mean and population standard deviation of a processed column.
/// Returns `None` for an empty slice.
pub fn mean_and_std_dev(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn conversion_factor_table() {
        let mag = magnetometer_factor(CONVERSION_VOLTS, CONVERSION_GAUSS, FIELD_GAIN);
        approx(mag, 0.001);
        for metal in [Metal::Rb85, Metal::Rb87, Metal::Cs133] {
            for energy in [EnergyLevel::High, EnergyLevel::Low] {
                approx(
                    conversion_factor(metal, energy),
                    mag * gyromagnetic_ratio(metal, energy),
                );
            }
        }
    }

    #[test]
    fn conversion_factors_are_negative_and_distinct() {
        let high = conversion_factor(Metal::Rb85, EnergyLevel::High);
        let low = conversion_factor(Metal::Rb85, EnergyLevel::Low);
        assert!(high < 0.0);
        assert!(low < 0.0);
        assert_ne!(high, low);
    }

    #[test]
    fn dmm_reference_is_first_voltage() {
        let dmm = dmm_frequencies(&[1.0, 1.0, 1.1], Metal::Rb85, EnergyLevel::High);
        let cf = conversion_factor(Metal::Rb85, EnergyLevel::High);
        approx(dmm[0], 0.0);
        approx(dmm[1], 0.0);
        approx(dmm[2], (1.1f64 - 1.0) * cf);
    }

    #[test]
    fn adjusted_round_trip() {
        let adjusted = adjust_keysight(&[10.0, 12.0, 15.0], &[0.0, 1.0, 2.0]);
        assert_eq!(adjusted, vec![10.0, 11.0, 13.0]);
    }

    #[test]
    fn elapsed_rebases_to_first_timestamp() {
        let elapsed = elapsed_from_timestamps(&[100.5, 101.3, 102.9]);
        approx(elapsed[0], 0.0);
        approx(elapsed[1], 0.8);
        approx(elapsed[2], 2.4);
    }

    #[test]
    fn overflow_filter_finds_exact_indices() {
        let values = [1.0, 9.9e37, 3.0, 2e11, 5.0];
        assert_eq!(find_overflow(&values, OVERFLOW_SENTINEL), vec![1, 3]);
    }

    #[test]
    fn overflow_removal_is_idempotent() {
        let mut columns = RawColumns {
            frequencies: vec!["100".into(), "9.9e37".into(), "102".into()],
            voltages: vec!["1.0".into(), "1.1".into(), "1.2".into()],
            times: vec!["0".into(), "0.8".into(), "1.6".into()],
        };
        assert_eq!(
            remove_overflow_rows(&mut columns, RawColumn::Frequencies).unwrap(),
            1
        );
        assert_eq!(columns.len(), 2);
        assert_eq!(columns.voltages, vec!["1.0", "1.2"]);
        assert_eq!(
            remove_overflow_rows(&mut columns, RawColumn::Frequencies).unwrap(),
            0
        );
    }

    #[test]
    fn malformed_column_reports_row() {
        let err = parse_column(&["1.0".into(), "oops".into()], "voltage").unwrap_err();
        match err {
            crate::error::DaqError::MalformedRecord { row, message } => {
                assert_eq!(row, 1);
                assert!(message.contains("voltage"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stats_use_population_std_dev() {
        let (mean, std) = mean_and_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        approx(mean, 5.0);
        approx(std, 2.0);
        assert!(mean_and_std_dev(&[]).is_none());
    }
}
