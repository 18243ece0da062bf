//! CLI entry point for kse-daq.
//!
//! Two subcommands:
//!
//! - `run`: a timed, mock-backed collection run. Useful for exercising the
//!   acquisition path end to end without bench hardware; real deployments
//!   construct [`kse_daq::acquisition::AcquisitionLoop`] with their own
//!   driver sessions instead.
//! - `process`: the post-run conversion pipeline over an existing raw log.
//!
//! ```bash
//! kse-daq run --config default --duration-s 10
//! kse-daq process data/run.csv --metal rb85 --energy high --layout real-time
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kse_daq::acquisition::{self, AcquisitionConfig, AcquisitionLoop};
use kse_daq::config::Settings;
use kse_daq::core::{EnergyLevel, Metal, RawLayout};
use kse_daq::feed::LiveFeed;
use kse_daq::instrument::mock::{FetchOutcome, MockAnalogOutput, MockSession};
use kse_daq::processing;
use kse_daq::storage::{self, RawLogWriter};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "kse-daq")]
#[command(about = "K_se EPR data collection and processing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a timed mock-backed collection and process the result
    Run {
        /// Config name under config/ (without extension)
        #[arg(long)]
        config: Option<String>,

        /// How long to collect before stopping
        #[arg(long, default_value = "10")]
        duration_s: u64,
    },

    /// Convert a raw log into calibrated measurements
    Process {
        /// Path to the raw CSV log
        raw: PathBuf,

        /// Alkali metal used for calibration
        #[arg(long)]
        metal: Metal,

        /// Energy level used for calibration
        #[arg(long)]
        energy: EnergyLevel,

        /// Raw file layout
        #[arg(long, default_value = "real-time")]
        layout: RawLayout,

        /// Output path (defaults to `<raw>_processed.csv`)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, duration_s } => run_collection(config.as_deref(), duration_s),
        Commands::Process {
            raw,
            metal,
            energy,
            layout,
            output,
        } => run_processing(&raw, metal, energy, layout, output),
    }
}

fn run_collection(config_name: Option<&str>, duration_s: u64) -> Result<()> {
    let settings = Settings::new(config_name).context("failed to load settings")?;
    std::fs::create_dir_all(&settings.output_folder)?;
    let raw_path = settings.output_folder.join(storage::timestamped_filename());

    // Mock bench: a slowly drifting field under a stable counter reading.
    let (counter, _counter_handle) = MockSession::new("keysight", FetchOutcome::Value(2_235_000.0));
    let (dmm, _dmm_handle) = MockSession::new("dmm", FetchOutcome::Value(1.02));
    let (output, _output_handle) = MockAnalogOutput::new();

    let writer = RawLogWriter::create(&raw_path, RawLayout::RealTime)?;
    let feed = LiveFeed::new();
    let stop = Arc::new(AtomicBool::new(false));
    let acq = AcquisitionLoop::new(
        Box::new(counter),
        Box::new(dmm),
        Box::new(output),
        writer,
        feed.clone(),
        AcquisitionConfig::from(&settings),
        Arc::clone(&stop),
    );

    println!("collecting for {duration_s}s into {}", raw_path.display());
    let handle = acquisition::spawn(acq);
    std::thread::sleep(Duration::from_secs(duration_s));
    let summary = handle.stop()?;

    println!(
        "collected {} samples in {} batches ({} overflow skips)",
        summary.samples_collected, summary.batches_written, summary.overflow_skips
    );
    if summary.stopped_by_error_threshold {
        println!("collection stopped early: consecutive-failure threshold reached");
    }

    if summary.samples_collected > 0 {
        let processed_path = storage::processed_path(&summary.raw_path);
        let records = processing::process(
            &summary.raw_path,
            settings.metal,
            settings.energy_level,
            RawLayout::RealTime,
        )?;
        processing::write_processed(&processed_path, &records)?;
        println!("processed output written to {}", processed_path.display());
    }
    Ok(())
}

fn run_processing(
    raw: &PathBuf,
    metal: Metal,
    energy: EnergyLevel,
    layout: RawLayout,
    output: Option<PathBuf>,
) -> Result<()> {
    let records = processing::process(raw, metal, energy, layout)
        .with_context(|| format!("failed to process {}", raw.display()))?;
    let out_path = output.unwrap_or_else(|| storage::processed_path(raw));
    processing::write_processed(&out_path, &records)?;

    let adjusted: Vec<f64> = records.iter().map(|r| r.adjusted_keysight).collect();
    if let Some((mean, std_dev)) = processing::mean_and_std_dev(&adjusted) {
        println!("adjusted frequency: mean {mean:.3} Hz, std dev {std_dev:.3} Hz");
    }
    println!(
        "{} records written to {}",
        records.len(),
        out_path.display()
    );
    Ok(())
}
