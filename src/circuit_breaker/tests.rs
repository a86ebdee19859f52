use super::*;

#[derive(Debug, thiserror::Error)]
#[error("boom")]
struct Boom;

fn fast_config() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 2,
        recovery_timeout: Duration::from_millis(50),
        success_threshold: 2,
    }
}

#[tokio::test]
async fn opens_after_failure_threshold_consecutive_failures() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..2 {
        let result: Result<(), BreakerOutcome<Boom>> =
            breaker.execute(|| async { Err(Boom) }).await;
        assert!(result.is_err());
    }
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn rejects_calls_while_open_without_invoking_op() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..2 {
        let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    }

    let mut invoked = false;
    let result: Result<(), BreakerOutcome<Boom>> = breaker
        .execute(|| {
            invoked = true;
            async { Ok(()) }
        })
        .await;
    assert!(matches!(result, Err(BreakerOutcome::Open(_))));
    assert!(!invoked);
}

#[tokio::test]
async fn half_open_after_recovery_timeout_then_closes_on_success_threshold() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..2 {
        let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    let r1: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Ok(()) }).await;
    assert!(r1.is_ok());
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    let r2: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Ok(()) }).await;
    assert!(r2.is_ok());
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn half_open_failure_reopens_immediately() {
    let breaker = CircuitBreaker::new(fast_config());
    for _ in 0..2 {
        let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    }
    tokio::time::sleep(Duration::from_millis(80)).await;

    let result: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    assert!(result.is_err());
    assert_eq!(breaker.state(), CircuitState::Open);
}

#[tokio::test]
async fn success_in_closed_state_resets_failure_count() {
    let breaker = CircuitBreaker::new(fast_config());
    let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Ok(()) }).await;
    let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test]
async fn half_open_admits_only_one_concurrent_probe() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let breaker = Arc::new(CircuitBreaker::new(fast_config()));
    for _ in 0..2 {
        let _: Result<(), BreakerOutcome<Boom>> = breaker.execute(|| async { Err(Boom) }).await;
    }
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(breaker.state(), CircuitState::Open);

    let concurrent_probes = Arc::new(AtomicUsize::new(0));
    let max_concurrent_probes = Arc::new(AtomicUsize::new(0));

    let run_probe = |breaker: Arc<CircuitBreaker>| {
        let concurrent_probes = Arc::clone(&concurrent_probes);
        let max_concurrent_probes = Arc::clone(&max_concurrent_probes);
        async move {
            breaker
                .execute(|| async {
                    let now = concurrent_probes.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent_probes.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    concurrent_probes.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), Boom>(())
                })
                .await
        }
    };

    let (first, second) = tokio::join!(
        run_probe(Arc::clone(&breaker)),
        run_probe(Arc::clone(&breaker))
    );

    // Exactly one of the two racing callers is admitted as the probe; the
    // other is rejected with the circuit still reporting open, never both
    // running `op()` at once.
    let admitted = [&first, &second]
        .iter()
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(max_concurrent_probes.load(Ordering::SeqCst), 1);
}

#[test]
fn reset_forces_closed() {
    let breaker = CircuitBreaker::new(fast_config());
    breaker.reset();
    assert_eq!(breaker.state(), CircuitState::Closed);
}
