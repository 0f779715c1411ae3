//! Consecutive-failure guard of a batch run.

use serde::Serialize;

/// Consecutive failures that abort a batch.
pub const FAILURE_THRESHOLD: u32 = 3;

/// Lifecycle of a batch loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Running,
    Tripped,
    Completed,
}

/// Counts consecutive unit failures and trips at the threshold.
///
/// Any success resets the counter.  Once tripped or completed the breaker
/// ignores further records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitBreaker {
    threshold: u32,
    consecutive_failures: u32,
    state: CircuitState,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(FAILURE_THRESHOLD)
    }
}

impl CircuitBreaker {
    /// A threshold of zero is treated as one.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive_failures: 0,
            state: CircuitState::Running,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Whether another unit may be started.
    pub fn allows_work(&self) -> bool {
        self.state == CircuitState::Running
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitState::Running {
            self.consecutive_failures = 0;
        }
    }

    /// Records a failure and returns the resulting state.
    pub fn record_failure(&mut self) -> CircuitState {
        if self.state == CircuitState::Running {
            self.consecutive_failures += 1;
            if self.consecutive_failures >= self.threshold {
                self.state = CircuitState::Tripped;
            }
        }
        self.state
    }

    /// Marks the unit list as exhausted.
    pub fn complete(&mut self) {
        if self.state == CircuitState::Running {
            self.state = CircuitState::Completed;
        }
    }

    /// Reason printed in the batch summary once tripped.
    pub fn trip_reason(&self) -> String {
        format!(
            "{} consecutive unit failures (threshold {})",
            self.consecutive_failures, self.threshold
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(outcomes: &[bool]) -> (usize, CircuitState) {
        let mut breaker = CircuitBreaker::default();
        let mut attempted = 0;
        for &ok in outcomes {
            if !breaker.allows_work() {
                break;
            }
            attempted += 1;
            if ok {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
        breaker.complete();
        (attempted, breaker.state())
    }

    #[test]
    fn three_consecutive_failures_trip() {
        let (attempted, state) = run(&[true, false, false, false, true, true]);
        assert_eq!(attempted, 4);
        assert_eq!(state, CircuitState::Tripped);
    }

    #[test]
    fn a_success_resets_the_count() {
        let (attempted, state) = run(&[true, false, false, true, false, false, true]);
        assert_eq!(attempted, 7);
        assert_eq!(state, CircuitState::Completed);
    }

    #[test]
    fn tripped_breaker_ignores_later_records() {
        let mut breaker = CircuitBreaker::new(1);
        assert_eq!(breaker.record_failure(), CircuitState::Tripped);
        breaker.record_success();
        breaker.complete();
        assert_eq!(breaker.state(), CircuitState::Tripped);
        assert_eq!(breaker.consecutive_failures(), 1);
        assert_eq!(breaker.trip_reason(), "1 consecutive unit failures (threshold 1)");
    }
}
