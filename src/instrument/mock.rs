//! Mock instrument implementations.
//!
//! Deterministic stand-ins for the frequency counter, the voltmeter, and the
//! analog-output channel. Each mock hands out a cloneable handle sharing its
//! state, so a test can drive the acquisition worker with one end and inspect
//! commands, levels, and close counts from the other.
//!
//! Fetch behavior is scripted, not random: a queue of [`FetchOutcome`]s is
//! consumed one entry per `FETC?` query, falling back to a default outcome
//! once the queue drains. That makes failure-threshold and overflow-skip
//! scenarios exactly reproducible.

use crate::error::{DaqError, Result};
use crate::instrument::{scpi, AnalogOutput, InstrumentSession};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Scripted reply to a single `FETC?` query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FetchOutcome {
    /// Reply with this reading.
    Value(f64),
    /// Reply with the hardware overflow sentinel.
    Overflow,
    /// Fail the query, as a disconnected or timed-out driver would.
    Fail,
}

#[derive(Debug, Default)]
struct SessionState {
    writes: Vec<String>,
    fetch_queue: VecDeque<FetchOutcome>,
    default_outcome: Option<FetchOutcome>,
    fetch_count: usize,
    close_count: usize,
}

/// Mock [`InstrumentSession`] with scripted fetch outcomes.
pub struct MockSession {
    name: &'static str,
    state: Arc<Mutex<SessionState>>,
}

/// Inspection handle for a [`MockSession`] owned by the worker thread.
#[derive(Clone)]
pub struct MockSessionHandle {
    state: Arc<Mutex<SessionState>>,
}

impl MockSession {
    /// Creates a session that answers every fetch with `default`.
    pub fn new(name: &'static str, default: FetchOutcome) -> (Self, MockSessionHandle) {
        let state = Arc::new(Mutex::new(SessionState {
            default_outcome: Some(default),
            ..SessionState::default()
        }));
        (
            Self {
                name,
                state: Arc::clone(&state),
            },
            MockSessionHandle { state },
        )
    }

    /// Queues outcomes consumed in order before the default applies.
    pub fn script(&self, outcomes: impl IntoIterator<Item = FetchOutcome>) {
        self.state.lock().fetch_queue.extend(outcomes);
    }
}

impl MockSessionHandle {
    /// All commands written so far, in order.
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Number of `FETC?` queries answered.
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetch_count
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl InstrumentSession for MockSession {
    fn write(&mut self, command: &str) -> Result<()> {
        self.state.lock().writes.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        if command != scpi::FETCH {
            // Stale register reads and the like get a throwaway reading.
            return Ok("+0.00000000000000E+000".to_string());
        }
        let mut state = self.state.lock();
        state.fetch_count += 1;
        let outcome = state
            .fetch_queue
            .pop_front()
            .or(state.default_outcome)
            .unwrap_or(FetchOutcome::Fail);
        match outcome {
            FetchOutcome::Value(v) => Ok(format!("{v:+.14E}")),
            FetchOutcome::Overflow => Ok("+9.90000000000000E+37".to_string()),
            FetchOutcome::Fail => Err(DaqError::Instrument(format!(
                "{}: query timed out",
                self.name
            ))),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().close_count += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OutputState {
    started: bool,
    levels: Vec<f64>,
    close_count: usize,
}

/// Mock [`AnalogOutput`] recording every level written.
pub struct MockAnalogOutput {
    state: Arc<Mutex<OutputState>>,
}

/// Inspection handle for a [`MockAnalogOutput`].
#[derive(Clone)]
pub struct MockAnalogOutputHandle {
    state: Arc<Mutex<OutputState>>,
}

impl MockAnalogOutput {
    /// Creates an output channel and its inspection handle.
    pub fn new() -> (Self, MockAnalogOutputHandle) {
        let state = Arc::new(Mutex::new(OutputState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockAnalogOutputHandle { state },
        )
    }
}

impl MockAnalogOutputHandle {
    /// Every DC level written so far, in order.
    pub fn levels(&self) -> Vec<f64> {
        self.state.lock().levels.clone()
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}

impl AnalogOutput for MockAnalogOutput {
    fn start(&mut self) -> Result<()> {
        self.state.lock().started = true;
        Ok(())
    }

    fn write(&mut self, level: f64) -> Result<()> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(DaqError::Instrument(
                "analog output written before start".into(),
            ));
        }
        state.levels.push(level);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.lock().close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_outcomes_then_default() {
        let (mut session, handle) = MockSession::new("counter", FetchOutcome::Value(10.0));
        session.script([FetchOutcome::Value(1.0), FetchOutcome::Fail]);

        assert_eq!(session.query(scpi::FETCH).unwrap(), format!("{:+.14E}", 1.0));
        assert!(session.query(scpi::FETCH).is_err());
        // Queue drained: default applies from here on.
        let reply: f64 = session.query(scpi::FETCH).unwrap().parse().unwrap();
        assert_eq!(reply, 10.0);
        assert_eq!(handle.fetch_count(), 3);
    }

    #[test]
    fn overflow_reply_parses_above_sentinel() {
        let (mut session, _handle) = MockSession::new("dmm", FetchOutcome::Overflow);
        let reply: f64 = session.query(scpi::FETCH).unwrap().parse().unwrap();
        assert!(crate::core::is_overflow(reply));
    }

    #[test]
    fn register_read_is_not_a_fetch() {
        let (mut session, handle) = MockSession::new("counter", FetchOutcome::Value(5.0));
        session.query(scpi::READ_REGISTER).unwrap();
        assert_eq!(handle.fetch_count(), 0);
    }

    #[test]
    fn output_requires_start() {
        let (mut out, handle) = MockAnalogOutput::new();
        assert!(out.write(2.0).is_err());
        out.start().unwrap();
        out.write(2.0).unwrap();
        out.write(0.0).unwrap();
        assert_eq!(handle.levels(), vec![2.0, 0.0]);
    }
}
