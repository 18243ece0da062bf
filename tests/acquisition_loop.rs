//! End-to-end acquisition worker scenarios over mock instruments.

use kse_daq::acquisition::{self, AcquisitionConfig, AcquisitionLoop, RunSummary};
use kse_daq::core::RawLayout;
use kse_daq::feed::LiveFeed;
use kse_daq::instrument::mock::{
    FetchOutcome, MockAnalogOutput, MockAnalogOutputHandle, MockSession, MockSessionHandle,
};
use kse_daq::storage::RawLogWriter;
use kse_daq::trigger::TriggerCycle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

struct Bench {
    acq: AcquisitionLoop,
    stop: Arc<AtomicBool>,
    raw_path: PathBuf,
    counter: MockSessionHandle,
    dmm: MockSessionHandle,
    output: MockAnalogOutputHandle,
    feed: LiveFeed,
    _dir: tempfile::TempDir,
}

fn config(batch_size: usize, error_threshold: u32, dwell: Duration) -> AcquisitionConfig {
    let trigger = TriggerCycle {
        high_level_v: 2.0,
        low_level_v: 0.0,
        high_dwell: dwell,
        low_dwell: dwell,
    };
    AcquisitionConfig {
        trigger,
        flush_pulse: TriggerCycle {
            high_dwell: Duration::ZERO,
            low_dwell: Duration::ZERO,
            ..trigger
        },
        batch_size,
        error_threshold,
    }
}

fn bench(
    counter_default: FetchOutcome,
    counter_script: &[FetchOutcome],
    cfg: AcquisitionConfig,
) -> Bench {
    let dir = tempfile::tempdir().unwrap();
    let raw_path = dir.path().join("run.csv");
    let (counter, counter_handle) = MockSession::new("keysight", counter_default);
    counter.script(counter_script.iter().copied());
    let (dmm, dmm_handle) = MockSession::new("dmm", FetchOutcome::Value(1.0));
    let (output, output_handle) = MockAnalogOutput::new();
    let writer = RawLogWriter::create(&raw_path, RawLayout::RealTime).unwrap();
    let feed = LiveFeed::new();
    let stop = Arc::new(AtomicBool::new(false));

    let acq = AcquisitionLoop::new(
        Box::new(counter),
        Box::new(dmm),
        Box::new(output),
        writer,
        feed.clone(),
        cfg,
        Arc::clone(&stop),
    );
    Bench {
        acq,
        stop,
        raw_path,
        counter: counter_handle,
        dmm: dmm_handle,
        output: output_handle,
        feed,
        _dir: dir,
    }
}

fn data_rows(path: &PathBuf) -> Vec<Vec<String>> {
    let text = std::fs::read_to_string(path).unwrap();
    text.lines()
        .skip(1)
        .map(|l| l.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn batches_flush_at_size_and_partial_on_stop() {
    // 7 valid readings, then sustained failure with threshold 2: two full
    // batches of 3 plus a final partial batch of 1.
    let script: Vec<FetchOutcome> = (0..7).map(|i| FetchOutcome::Value(100.0 + i as f64)).collect();
    let b = bench(
        FetchOutcome::Fail,
        &script,
        config(3, 2, Duration::from_millis(1)),
    );

    let summary: RunSummary = acquisition::spawn(b.acq).join().unwrap();

    assert_eq!(summary.samples_collected, 7);
    assert_eq!(summary.batches_written, 3);
    assert!(summary.stopped_by_error_threshold);

    let rows = data_rows(&b.raw_path);
    assert_eq!(rows.len(), 7);
    // Rows are in cycle order.
    assert_eq!(rows[0][0], "100");
    assert_eq!(rows[6][0], "106");
    // First elapsed value is exactly zero.
    assert_eq!(rows[0][2], "0");
    assert_eq!(b.feed.len(), 7);
}

#[test]
fn overflow_readings_skip_without_counting_as_failures() {
    // Threshold 1, so a single counted failure would stop the run before
    // the second valid sample. The overflow between them must not count.
    let script = [
        FetchOutcome::Value(100.0),
        FetchOutcome::Overflow,
        FetchOutcome::Value(101.0),
    ];
    let b = bench(
        FetchOutcome::Fail,
        &script,
        config(10, 1, Duration::from_millis(1)),
    );

    let summary = acquisition::spawn(b.acq).join().unwrap();

    assert_eq!(summary.samples_collected, 2);
    assert_eq!(summary.overflow_skips, 1);
    assert!(summary.stopped_by_error_threshold);
    assert_eq!(data_rows(&b.raw_path).len(), 2);
}

#[test]
fn threshold_resets_on_intervening_success() {
    // fail, fail, value, fail, fail, value ... threshold 3 never trips;
    // run ends via cooperative stop instead.
    let script = [
        FetchOutcome::Fail,
        FetchOutcome::Fail,
        FetchOutcome::Value(100.0),
        FetchOutcome::Fail,
        FetchOutcome::Fail,
        FetchOutcome::Value(101.0),
    ];
    let b = bench(
        FetchOutcome::Value(102.0),
        &script,
        config(10, 3, Duration::from_millis(1)),
    );

    let handle = acquisition::spawn(b.acq);
    while b.counter.fetch_count() < 8 {
        std::thread::sleep(Duration::from_millis(2));
    }
    let summary = handle.stop().unwrap();

    assert!(!summary.stopped_by_error_threshold);
    assert!(summary.samples_collected >= 2);
}

#[test]
fn cooperative_stop_flushes_partial_batch_and_closes_once() {
    let dwell = Duration::from_millis(5);
    let b = bench(FetchOutcome::Value(2_235_000.0), &[], config(10, 3, dwell));

    let handle = acquisition::spawn(b.acq);
    std::thread::sleep(Duration::from_millis(60));
    let summary = handle.stop().unwrap();

    assert!(!summary.stopped_by_error_threshold);
    assert!(summary.samples_collected >= 1);
    assert!(summary.samples_collected < 10, "batch never filled");
    // The partial buffer was flushed before close: every sample is on disk.
    assert_eq!(summary.batches_written, 1);
    let rows = data_rows(&b.raw_path);
    assert_eq!(rows.len(), summary.samples_collected);

    // Resources released exactly once despite stop + handle drop.
    assert_eq!(b.counter.close_count(), 1);
    assert_eq!(b.dmm.close_count(), 1);
    assert_eq!(b.output.close_count(), 1);
}

#[test]
fn elapsed_tracks_cycle_cadence() {
    let dwell = Duration::from_millis(5);
    let period = 0.010;
    let b = bench(FetchOutcome::Value(100.0), &[], config(10, 3, dwell));

    let handle = acquisition::spawn(b.acq);
    std::thread::sleep(Duration::from_millis(45));
    let summary = handle.stop().unwrap();
    assert!(summary.samples_collected >= 2);

    let rows = data_rows(&b.raw_path);
    let elapsed: Vec<f64> = rows.iter().map(|r| r[2].parse().unwrap()).collect();

    assert_eq!(elapsed[0], 0.0);
    for (i, pair) in elapsed.windows(2).enumerate() {
        assert!(
            pair[1] > pair[0],
            "elapsed must increase strictly at row {i}"
        );
    }
    // Each cycle dwells for at least one full period, so elapsed can only
    // run ahead of the nominal cadence, never behind it.
    for (i, e) in elapsed.iter().enumerate() {
        assert!(*e + 1e-6 >= i as f64 * period, "row {i}: {e}");
    }
}

#[test]
fn trigger_levels_alternate_high_low() {
    let script = [FetchOutcome::Value(100.0)];
    let b = bench(
        FetchOutcome::Fail,
        &script,
        config(10, 1, Duration::from_millis(1)),
    );

    acquisition::spawn(b.acq).join().unwrap();

    let levels = b.output.levels();
    // Initialization parks the output at 0 V, then every pulse (flush and
    // main alike) writes high then low.
    assert_eq!(levels[0], 0.0);
    let pulses = &levels[1..];
    assert_eq!(pulses.len() % 2, 0);
    for pair in pulses.chunks(2) {
        assert_eq!(pair, [2.0, 0.0]);
    }
}
