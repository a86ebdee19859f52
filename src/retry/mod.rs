//! Retryability classification and backoff scheduling.

#[cfg(test)]
mod tests;

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

/// Kinds an error may be classified as for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectionFailure,
    Timeout,
    ServiceUnavailable,
    TransientUpstream,
    Other,
}

const RETRYABLE_SUBSTRINGS: &[&str] = &[
    "timeout",
    "connection",
    "network",
    "unavailable",
    "temporary",
    "rate limit",
    "503",
    "502",
    "504",
];

/// `true` if `kind` is inherently retryable, or, failing that, if `message`
/// contains one of the known transient-error substrings (case-insensitive).
pub fn is_retryable(kind: ErrorKind, message: &str) -> bool {
    match kind {
        ErrorKind::ConnectionFailure
        | ErrorKind::Timeout
        | ErrorKind::ServiceUnavailable
        | ErrorKind::TransientUpstream => true,
        ErrorKind::Other => {
            let lower = message.to_lowercase();
            RETRYABLE_SUBSTRINGS.iter().any(|s| lower.contains(s))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `i` (0-indexed), clamped to `max_delay` and
    /// jittered by a uniform factor in `[0.5, 1.5)` when enabled.
    pub fn delay_for_attempt(&self, i: u32) -> Duration {
        let raw = self.initial_delay.as_secs_f64() * self.base.powi(i as i32);
        let clamped = raw.min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            rand::thread_rng().gen_range(0.5..1.5)
        } else {
            1.0
        };
        Duration::from_secs_f64((clamped * factor).max(0.0))
    }
}

/// An error a retried operation can fail with, carrying enough to classify
/// retryability.
pub trait Classifiable {
    fn error_kind(&self) -> ErrorKind;
    fn message(&self) -> String;
}

/// Runs `op` up to `config.max_attempts` times, sleeping between attempts per
/// [`RetryConfig::delay_for_attempt`]. Stops retrying as soon as an error is
/// classified non-retryable. Accumulated delay still elapses even if the
/// surrounding future is later cancelled, since the sleep is awaited inline.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    E: Classifiable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = is_retryable(err.error_kind(), &err.message());
                attempt += 1;
                if !retryable || attempt >= config.max_attempts {
                    return Err(err);
                }
                let delay = config.delay_for_attempt(attempt - 1);
                debug!(attempt, ?delay, "retrying after classified-retryable error");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
