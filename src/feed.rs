//! Live display feed.
//!
//! The acquisition worker publishes each validated sample here; a UI layer
//! polls `snapshot` at its own pace. History is bounded (oldest points are
//! evicted) and publishing never blocks the producer, so a stalled or
//! absent display cannot slow the trigger cadence.

use crate::core::Sample;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of points retained for display.
pub const DEFAULT_MAX_POINTS: usize = 150;

/// One displayable point: elapsed seconds vs. measured frequency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedPoint {
    /// Seconds since the start of the run.
    pub elapsed_s: f64,
    /// Frequency counter reading in Hz.
    pub frequency_hz: f64,
}

/// Bounded-history publisher for live display of incoming samples.
#[derive(Clone)]
pub struct LiveFeed {
    history: Arc<Mutex<VecDeque<FeedPoint>>>,
    max_points: usize,
}

impl LiveFeed {
    /// Creates a feed retaining [`DEFAULT_MAX_POINTS`] points.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_POINTS)
    }

    /// Creates a feed retaining at most `max_points` points.
    pub fn with_capacity(max_points: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(VecDeque::with_capacity(max_points))),
            max_points: max_points.max(1),
        }
    }

    /// Publishes one sample, evicting the oldest point when full.
    pub fn publish(&self, sample: &Sample) {
        let mut history = self.history.lock();
        if history.len() == self.max_points {
            history.pop_front();
        }
        history.push_back(FeedPoint {
            elapsed_s: sample.elapsed_s,
            frequency_hz: sample.frequency_hz,
        });
    }

    /// Copy of the retained history, oldest first.
    pub fn snapshot(&self) -> Vec<FeedPoint> {
        self.history.lock().iter().copied().collect()
    }

    /// Number of points currently retained.
    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }
}

impl Default for LiveFeed {
    fn default() -> Self {
        Self::new()
    }
}
