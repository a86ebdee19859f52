use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
struct FakeError {
    kind: ErrorKind,
    message: &'static str,
}

impl Classifiable for FakeError {
    fn error_kind(&self) -> ErrorKind {
        self.kind
    }
    fn message(&self) -> String {
        self.message.to_string()
    }
}

#[test]
fn classifies_typed_kinds_as_retryable() {
    assert!(is_retryable(ErrorKind::Timeout, ""));
    assert!(is_retryable(ErrorKind::ConnectionFailure, ""));
    assert!(is_retryable(ErrorKind::ServiceUnavailable, ""));
    assert!(is_retryable(ErrorKind::TransientUpstream, ""));
}

#[test]
fn classifies_by_message_substring_case_insensitive() {
    assert!(is_retryable(ErrorKind::Other, "Connection Timeout occurred"));
    assert!(is_retryable(ErrorKind::Other, "HTTP 503 Service Unavailable"));
    assert!(is_retryable(ErrorKind::Other, "rate limit exceeded"));
    assert!(!is_retryable(ErrorKind::Other, "invalid api key"));
}

#[test]
fn delay_grows_exponentially_and_clamps() {
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(500),
        base: 2.0,
        jitter: false,
    };
    assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    // 100 * 2^3 = 800, clamped to 500
    assert_eq!(config.delay_for_attempt(3), Duration::from_millis(500));
}

#[tokio::test]
async fn retries_up_to_max_attempts_then_gives_up() {
    let calls = AtomicU32::new(0);
    let config = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        base: 1.0,
        jitter: false,
    };

    let result: Result<(), FakeError> = retry(&config, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err(FakeError {
                kind: ErrorKind::Timeout,
                message: "timeout",
            })
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_retryable_error_stops_after_first_attempt() {
    let calls = AtomicU32::new(0);
    let config = RetryConfig::default();

    let result: Result<(), FakeError> = retry(&config, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err(FakeError {
                kind: ErrorKind::Other,
                message: "invalid request: bad model name",
            })
        }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let config = RetryConfig {
        max_attempts: 5,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        base: 1.0,
        jitter: false,
    };

    let result = retry(&config, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(FakeError {
                    kind: ErrorKind::Timeout,
                    message: "timeout",
                })
            } else {
                Ok::<_, FakeError>(42)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
