//! Consecutive-failure shutdown policy.
//!
//! Transient instrument timeouts are common on this bench and must not
//! abort a run, but a sustained failure (a disconnected cable, a wedged
//! adapter) has to stop the loop rather than spin indefinitely writing
//! nothing. The policy is a plain counter: successes reset it, failures
//! increment it, and the fatal signal fires exactly once when the count
//! reaches the configured threshold.

/// Counts consecutive fetch failures against a shutdown threshold.
#[derive(Debug)]
pub struct ErrorPolicy {
    threshold: u32,
    consecutive: u32,
    tripped: bool,
}

impl ErrorPolicy {
    /// Creates a policy that trips after `threshold` consecutive failures.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            tripped: false,
        }
    }

    /// Records a successful cycle, resetting the consecutive count.
    pub fn on_success(&mut self) {
        self.consecutive = 0;
    }

    /// Records one failure. Returns `true` exactly once, at the moment the
    /// consecutive count reaches the threshold.
    pub fn on_failure(&mut self) -> bool {
        self.consecutive += 1;
        if self.consecutive >= self.threshold && !self.tripped {
            self.tripped = true;
            return true;
        }
        false
    }

    /// Whether the fatal signal has fired.
    pub fn is_fatal(&self) -> bool {
        self.tripped
    }

    /// Current consecutive-failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_once_at_threshold() {
        let mut policy = ErrorPolicy::new(3);
        assert!(!policy.on_failure());
        assert!(!policy.on_failure());
        assert!(policy.on_failure());
        assert!(policy.is_fatal());
        // Further failures never re-signal.
        assert!(!policy.on_failure());
    }

    #[test]
    fn success_resets_count() {
        // 2 failures, 1 success, 2 failures: never trips at threshold 3.
        let mut policy = ErrorPolicy::new(3);
        assert!(!policy.on_failure());
        assert!(!policy.on_failure());
        policy.on_success();
        assert!(!policy.on_failure());
        assert!(!policy.on_failure());
        assert!(!policy.is_fatal());
        assert_eq!(policy.consecutive_failures(), 2);
    }

    #[test]
    fn threshold_of_one_trips_immediately() {
        let mut policy = ErrorPolicy::new(1);
        assert!(policy.on_failure());
    }
}
