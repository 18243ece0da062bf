//! Acquisition loop and worker-thread lifecycle.
//!
//! Exactly one background worker owns both instrument sessions, the analog
//! output, and the raw-log writer; all instrument I/O is blocking and is
//! issued only from that thread. The loop walks a fixed state machine:
//!
//! ```text
//! Idle -> Initializing -> Cycling -> Stopping -> Closed
//! ```
//!
//! Each cycling iteration re-arms both instruments with a flush pass
//! (each device buffers only one pending trigger), runs one trigger pulse,
//! fetches both readings, and gates the result: valid pairs go to the
//! batch buffer and the live feed, overflow readings are skipped without
//! penalty, and fetch failures feed the consecutive-failure policy.
//!
//! Stop is cooperative: an atomic flag read at the top of each iteration.
//! A stop request takes effect after the in-flight cycle finishes, bounded
//! by the dwell times. The `Stopping -> Closed` transition flushes any
//! partial batch and releases every resource exactly once; re-entering it
//! is a no-op.

use crate::config::Settings;
use crate::core::{is_overflow, Sample};
use crate::error::{DaqError, Result};
use crate::error_policy::ErrorPolicy;
use crate::feed::LiveFeed;
use crate::instrument::{scpi, AnalogOutput, InstrumentSession};
use crate::storage::RawLogWriter;
use crate::trigger::TriggerCycle;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Acquisition loop lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, instruments untouched.
    Idle,
    /// Configuring instruments and zeroing the output.
    Initializing,
    /// Collecting samples.
    Cycling,
    /// Flushing the partial batch and releasing resources.
    Stopping,
    /// All resources released.
    Closed,
}

/// Loop parameters taken from [`Settings`].
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionConfig {
    /// Main trigger pulse driven once per sample.
    pub trigger: TriggerCycle,
    /// Short dummy pulse used to discard the stale buffered reading.
    pub flush_pulse: TriggerCycle,
    /// Samples accumulated before each CSV append.
    pub batch_size: usize,
    /// Consecutive fetch failures tolerated before shutdown.
    pub error_threshold: u32,
}

impl From<&Settings> for AcquisitionConfig {
    fn from(settings: &Settings) -> Self {
        let t = settings.trigger;
        Self {
            trigger: TriggerCycle {
                high_level_v: t.high_level_v,
                low_level_v: t.low_level_v,
                high_dwell: Duration::from_secs_f64(t.high_dwell_s),
                low_dwell: Duration::from_secs_f64(t.low_dwell_s),
            },
            flush_pulse: TriggerCycle {
                high_level_v: t.high_level_v,
                low_level_v: t.low_level_v,
                high_dwell: Duration::from_secs_f64(t.flush_dwell_s),
                low_dwell: Duration::from_secs_f64(t.flush_dwell_s),
            },
            batch_size: settings.batch_size,
            error_threshold: settings.error_threshold,
        }
    }
}

/// Outcome of a finished run, returned when the worker joins.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Valid samples persisted to the raw log.
    pub samples_collected: usize,
    /// Non-empty batches appended, including the final partial one.
    pub batches_written: usize,
    /// Cycles skipped because a reading carried the overflow sentinel.
    pub overflow_skips: usize,
    /// Whether the consecutive-failure threshold forced the shutdown.
    pub stopped_by_error_threshold: bool,
    /// Path of the raw log file.
    pub raw_path: std::path::PathBuf,
}

/// Mutable per-run state, owned exclusively by the worker while running.
struct RunContext {
    start_timestamp: Option<f64>,
    batch: Vec<Sample>,
    policy: ErrorPolicy,
    samples_collected: usize,
    overflow_skips: usize,
}

/// One full acquisition run over injected instrument sessions.
pub struct AcquisitionLoop {
    freq_counter: Box<dyn InstrumentSession>,
    dmm: Box<dyn InstrumentSession>,
    output: Box<dyn AnalogOutput>,
    writer: RawLogWriter,
    feed: LiveFeed,
    config: AcquisitionConfig,
    stop: Arc<AtomicBool>,
    state: LoopState,
    ctx: RunContext,
}

impl AcquisitionLoop {
    /// Builds a loop in the `Idle` state. Nothing touches the instruments
    /// until [`run`](Self::run).
    pub fn new(
        freq_counter: Box<dyn InstrumentSession>,
        dmm: Box<dyn InstrumentSession>,
        output: Box<dyn AnalogOutput>,
        writer: RawLogWriter,
        feed: LiveFeed,
        config: AcquisitionConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let policy = ErrorPolicy::new(config.error_threshold);
        Self {
            freq_counter,
            dmm,
            output,
            writer,
            feed,
            config,
            stop,
            state: LoopState::Idle,
            ctx: RunContext {
                start_timestamp: None,
                batch: Vec::new(),
                policy,
                samples_collected: 0,
                overflow_skips: 0,
            },
        }
    }

    /// Runs the full lifecycle to completion and returns the run summary.
    ///
    /// Never propagates a transient instrument fault mid-run; the loop
    /// terminates only through the idempotent close path, so sessions and
    /// the raw log are always released.
    pub fn run(mut self) -> Result<RunSummary> {
        let outcome = self.initialize().and_then(|()| {
            self.state = LoopState::Cycling;
            self.cycle_until_stopped();
            Ok(())
        });
        // Close path runs regardless of how initialization or cycling ended.
        self.close_all();
        outcome?;

        Ok(RunSummary {
            samples_collected: self.ctx.samples_collected,
            batches_written: self.writer.batches_written(),
            overflow_skips: self.ctx.overflow_skips,
            stopped_by_error_threshold: self.ctx.policy.is_fatal(),
            raw_path: self.writer.path().to_path_buf(),
        })
    }

    /// Resets and configures both instruments and arms the analog output.
    fn initialize(&mut self) -> Result<()> {
        self.state = LoopState::Initializing;
        info!("initializing instruments");

        let trig_source = scpi::trigger_source("EXT");
        let trig_count = scpi::trigger_count(1);

        // Frequency counter: reset, clear queues, frequency mode, external
        // rising-edge trigger.
        self.freq_counter.write(scpi::RESET)?;
        self.freq_counter.write(scpi::STATUS_PRESET)?;
        self.freq_counter.write(scpi::CLEAR_STATUS)?;
        self.freq_counter.write(scpi::CONFIGURE_FREQUENCY)?;
        self.freq_counter.write(&trig_source)?;
        self.freq_counter.write(scpi::TRIGGER_SLOPE_POSITIVE)?;

        // Analog output armed and parked at 0 V.
        self.output.start()?;
        self.output.write(0.0)?;

        // Voltmeter: reset, external trigger, one reading per trigger.
        self.dmm.write(scpi::RESET)?;
        self.dmm.write(&trig_source)?;
        self.dmm.write(&trig_count)?;
        self.dmm.write(scpi::SAMPLE_COUNT_ONE)?;

        info!("instruments ready");
        Ok(())
    }

    /// Re-arms both instruments for the next reading.
    ///
    /// Each device buffers only one pending trigger, and arming the counter
    /// leaves a stale point in its register. A short dummy pulse plus an
    /// `R?` read discards it so timestamps line up with fetched readings.
    fn flush_pass(&mut self) -> Result<()> {
        self.freq_counter.write(scpi::INITIATE)?;
        self.config.flush_pulse.run(&mut *self.output)?;
        self.freq_counter.query(scpi::READ_REGISTER)?;
        self.dmm.write(scpi::INITIATE)?;
        Ok(())
    }

    /// Runs cycles until the stop flag is raised or the policy trips.
    fn cycle_until_stopped(&mut self) {
        info!("collecting data");
        while !self.stop.load(Ordering::Relaxed) {
            match self.one_cycle() {
                Ok(()) => self.ctx.policy.on_success(),
                Err(err) => {
                    warn!("error collecting data point: {err}");
                    if self.ctx.policy.on_failure() {
                        warn!(
                            "{} consecutive failures, stopping collection",
                            self.config.error_threshold
                        );
                        break;
                    }
                    // Transient: next iteration re-arms and re-triggers
                    // from scratch.
                }
            }
        }
    }

    /// One full sample cycle: flush pass, trigger pulse, fetch, gate, emit.
    fn one_cycle(&mut self) -> Result<()> {
        self.flush_pass()?;

        let t1 = self.config.trigger.run(&mut *self.output)?;
        // First-ever cycle defines the run's time origin.
        let start = *self.ctx.start_timestamp.get_or_insert(t1);
        let elapsed = t1 - start;

        let frequency_hz = parse_reading(self.freq_counter.query(scpi::FETCH)?)?;
        let voltage_v = parse_reading(self.dmm.query(scpi::FETCH)?)?;

        // Overflow sentinels are valid replies, not failures: skip the
        // cycle without touching the failure count.
        if is_overflow(frequency_hz) || is_overflow(voltage_v) {
            self.ctx.overflow_skips += 1;
            debug!("overflow reading skipped at t={elapsed:.3}s");
            return Ok(());
        }

        let sample = Sample {
            timestamp: t1,
            frequency_hz,
            voltage_v,
            elapsed_s: elapsed,
        };
        self.feed.publish(&sample);
        self.ctx.batch.push(sample);
        self.ctx.samples_collected += 1;

        if self.ctx.batch.len() >= self.config.batch_size {
            self.writer.append_batch(&self.ctx.batch)?;
            self.ctx.batch.clear();
        }
        Ok(())
    }

    /// `Stopping -> Closed`: flush the partial batch and release every
    /// resource. Idempotent; errors here are logged, not propagated, so
    /// one failing close cannot leak the others.
    fn close_all(&mut self) {
        if self.state == LoopState::Closed {
            return;
        }
        self.state = LoopState::Stopping;

        if !self.ctx.batch.is_empty() {
            if let Err(err) = self.writer.append_batch(&self.ctx.batch) {
                warn!("failed to flush final batch: {err}");
            }
            self.ctx.batch.clear();
        }
        if let Err(err) = self.writer.close() {
            warn!("failed to close raw log: {err}");
        }
        if let Err(err) = self.freq_counter.close() {
            warn!("failed to close frequency counter: {err}");
        }
        if let Err(err) = self.dmm.close() {
            warn!("failed to close voltmeter: {err}");
        }
        if let Err(err) = self.output.close() {
            warn!("failed to close analog output: {err}");
        }

        self.state = LoopState::Closed;
        info!("acquisition closed");
    }
}

fn parse_reading(reply: String) -> Result<f64> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| DaqError::Instrument(format!("unparseable reading {reply:?}")))
}

/// Handle to a spawned acquisition worker.
pub struct AcquisitionHandle {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Result<RunSummary>>>,
}

impl AcquisitionHandle {
    /// Raises the stop flag without waiting. The worker exits after its
    /// in-flight cycle, bounded by the dwell times.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Raises the stop flag and waits for the worker to finish.
    pub fn stop(mut self) -> Result<RunSummary> {
        self.request_stop();
        self.join_inner()
    }

    /// Waits for the worker to finish on its own (e.g. threshold trip).
    pub fn join(mut self) -> Result<RunSummary> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<RunSummary> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| DaqError::Processing("acquisition worker panicked".into()))?,
            None => Err(DaqError::Processing("worker already joined".into())),
        }
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        // Host-process teardown: request stop and let the worker reach its
        // own close path. The join is bounded by one cycle.
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// Spawns the acquisition worker thread that runs `acq` to completion.
pub fn spawn(acq: AcquisitionLoop) -> AcquisitionHandle {
    let stop = Arc::clone(&acq.stop);
    let worker = thread::Builder::new()
        .name("kse-acquisition".into())
        .spawn(move || acq.run());
    match worker {
        Ok(handle) => AcquisitionHandle {
            stop,
            worker: Some(handle),
        },
        Err(err) => {
            // Spawn failure leaves nothing running; surface it on join.
            let failed: Result<RunSummary> = Err(DaqError::Io(err));
            AcquisitionHandle {
                stop,
                worker: Some(thread::spawn(move || failed)),
            }
        }
    }
}
