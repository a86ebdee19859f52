//! Per-provider circuit breaker state machine.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    /// Set while a Half-Open probe is executing. Checked and set under the
    /// same lock as the state transition so "one probe at a time" holds
    /// even when two callers race `execute()` concurrently.
    probe_in_flight: bool,
}

/// What [`CircuitBreaker::enter`] decided for one caller.
enum Admission {
    Rejected,
    Allowed,
}

/// A single error variant returned when the breaker is blocking calls.
#[derive(Debug, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpen;

/// Per-provider Closed/Open/Half-Open gate. `execute` wraps a fallible async
/// operation and drives the state transitions described in the module docs.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Forces the breaker back to `Closed`, resetting all counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition_to_closed(&mut inner);
    }

    /// Executes `op` through the breaker. Returns `Err(CircuitOpen)` without
    /// calling `op` if the circuit is open and the recovery timeout has not
    /// elapsed, or if a Half-Open probe is already in flight; otherwise runs
    /// `op` and feeds the result back into the state machine.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerOutcome<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.enter() {
            Admission::Rejected => return Err(BreakerOutcome::Open(CircuitOpen)),
            Admission::Allowed => {}
        }

        match op().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(BreakerOutcome::Inner(err))
            }
        }
    }

    /// `true` if a call right now would be rejected by the breaker.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => false,
            CircuitState::HalfOpen => inner.probe_in_flight,
            CircuitState::Open => !self.should_attempt_reset(&inner),
        }
    }

    /// Atomically decides whether this caller may proceed and, if it may,
    /// records that decision (transitioning Open → Half-Open on timeout
    /// expiry, or claiming the single Half-Open probe slot) under the same
    /// lock, so two concurrent callers can never both be admitted as the
    /// probe.
    fn enter(&self) -> Admission {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                if self.should_attempt_reset(&inner) {
                    self.transition_to_half_open(&mut inner);
                    inner.probe_in_flight = true;
                    Admission::Allowed
                } else {
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Allowed
                }
            }
        }
    }

    fn should_attempt_reset(&self, inner: &Inner) -> bool {
        match inner.opened_at {
            Some(opened_at) => opened_at.elapsed() >= self.config.recovery_timeout,
            None => false,
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    self.transition_to_closed(&mut inner);
                } else {
                    // Probe succeeded but threshold not yet met: release the
                    // slot so the next caller can run the next probe.
                    inner.probe_in_flight = false;
                }
            }
            _ => inner.consecutive_failures = 0,
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            CircuitState::HalfOpen => self.transition_to_open(&mut inner),
            _ => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.transition_to_open(&mut inner);
                }
            }
        }
    }

    fn transition_to_closed(&self, inner: &mut Inner) {
        info!(state = "closed", "circuit breaker closing");
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.consecutive_successes = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
    }

    fn transition_to_open(&self, inner: &mut Inner) {
        warn!(state = "open", "circuit breaker opening");
        inner.state = CircuitState::Open;
        inner.consecutive_successes = 0;
        inner.opened_at = Some(Instant::now());
        inner.probe_in_flight = false;
    }

    fn transition_to_half_open(&self, inner: &mut Inner) {
        info!(state = "half_open", "circuit breaker probing");
        inner.state = CircuitState::HalfOpen;
        inner.consecutive_successes = 0;
        inner.consecutive_failures = 0;
    }
}

/// What [`CircuitBreaker::execute`] failed with: the breaker itself, or the
/// wrapped operation's own error.
#[derive(Debug, thiserror::Error)]
pub enum BreakerOutcome<E: std::error::Error + 'static> {
    #[error(transparent)]
    Open(#[from] CircuitOpen),
    #[error(transparent)]
    Inner(E),
}
