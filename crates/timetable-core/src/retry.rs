//! Bounded retry state machine for oracle calls and document downloads.
//!
//! ```text
//! Pending ──ok──► Succeeded
//!    │
//!    └─retryable─► Retrying(1) ─► Retrying(2) ─► ... ─► Failed
//! ```
//!
//! The machine only decides; the caller performs the attempt and the sleep.

use std::time::Duration;

/// How an attempt ended, as seen by the retry machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Usable output.
    Success,
    /// Output that did not decode; retried without delay.
    Malformed,
    /// Transport or service failure; retried after a backoff delay.
    Transient,
    /// Output that decoded to an unusable shape; not retried.
    Unusable,
}

/// Where a slot's oracle call stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// No attempt has finished yet.
    Pending,
    /// `n` attempts have failed and another is due.
    Retrying(u32),
    Succeeded,
    Failed,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Attempts that have failed so far.
    pub fn failures(self) -> u32 {
        match self {
            Self::Retrying(n) => n,
            _ => 0,
        }
    }
}

/// Attempt limit and backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Builder: set backoff parameters.
    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Delay after the `failures`-th transient failure: 2s, 4s, 8s, ...
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let delay = base * self.multiplier.powi(failures as i32 - 1);
        let max = self.max_backoff.as_secs_f64();

        Duration::from_secs_f64(delay.min(max))
    }

    /// Applies the outcome of the attempt that just finished.
    ///
    /// Returns the next state and how long to wait before the next attempt.
    /// The delay is zero for terminal states.
    pub fn advance(&self, state: RetryState, outcome: AttemptOutcome) -> (RetryState, Duration) {
        if state.is_terminal() {
            return (state, Duration::ZERO);
        }

        let failures = state.failures() + 1;
        match outcome {
            AttemptOutcome::Success => (RetryState::Succeeded, Duration::ZERO),
            AttemptOutcome::Unusable => (RetryState::Failed, Duration::ZERO),
            _ if failures >= self.max_attempts => (RetryState::Failed, Duration::ZERO),
            AttemptOutcome::Malformed => (RetryState::Retrying(failures), Duration::ZERO),
            AttemptOutcome::Transient => {
                (RetryState::Retrying(failures), self.backoff_delay(failures))
            }
        }
    }
}
