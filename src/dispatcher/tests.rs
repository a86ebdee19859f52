use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::provider::MockProvider;

fn request() -> CompletionRequest {
    CompletionRequest {
        model: "gpt-4o-mini".to_string(),
        prompt: "hello".to_string(),
        max_tokens: None,
        temperature: None,
    }
}

fn dispatcher(providers: Vec<Arc<dyn Provider>>, config: DispatcherConfig) -> Dispatcher {
    Dispatcher::new(
        providers,
        config,
        Arc::new(RateLimiter::new(crate::rate_limiter::RateLimiterConfig {
            default_requests_per_minute: 1_000,
            ..Default::default()
        })),
        Arc::new(CostTracker::new()),
    )
}

#[tokio::test]
async fn preferred_picks_requested_provider() {
    let primary = Arc::new(MockProvider::new("primary"));
    let secondary = Arc::new(MockProvider::new("secondary"));
    let d = dispatcher(
        vec![primary.clone(), secondary.clone()],
        DispatcherConfig::default(),
    );

    let response = d.dispatch(&request(), Some("secondary")).await.unwrap();
    assert!(response.response.text.contains("hello"));
}

#[tokio::test]
async fn falls_back_when_primary_exhausts_retries() {
    let primary = Arc::new(MockProvider::new("primary"));
    for _ in 0..5 {
        primary.push_failure(ProviderError::Timeout {
            provider: "primary".to_string(),
        });
    }
    let secondary = Arc::new(MockProvider::new("secondary"));
    secondary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 3,
    }));

    let mut config = DispatcherConfig::default();
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(1);

    let d = dispatcher(vec![primary, secondary], config);
    let response = d.dispatch(&request(), Some("primary")).await.unwrap();
    assert_eq!(response.response.text, "Paris");
    assert_eq!(response.provider, "secondary");
}

#[tokio::test]
async fn cost_is_recorded_once_against_the_serving_provider() {
    let primary = Arc::new(MockProvider::new("primary"));
    primary.push_failure(ProviderError::Timeout {
        provider: "primary".to_string(),
    });
    let secondary = Arc::new(MockProvider::new("secondary"));
    secondary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 3,
    }));

    let mut config = DispatcherConfig::default();
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(1);

    let rate_limiter = Arc::new(RateLimiter::new(crate::rate_limiter::RateLimiterConfig {
        default_requests_per_minute: 1_000,
        ..Default::default()
    }));
    let cost_tracker = Arc::new(CostTracker::new());
    let d = Dispatcher::new(vec![primary, secondary], config, rate_limiter, Arc::clone(&cost_tracker));

    let outcome = d.dispatch(&request(), Some("primary")).await.unwrap();
    assert_eq!(outcome.provider, "secondary");
    assert_eq!(cost_tracker.entry_count(), 1);
    assert_eq!(
        cost_tracker.cost_by_provider().get("secondary").copied(),
        Some(outcome.cost_usd)
    );
    assert!(cost_tracker.cost_by_provider().get("primary").is_none());
}

#[tokio::test]
async fn dispatch_failed_when_all_providers_fail() {
    let primary = Arc::new(MockProvider::new("primary"));
    primary.push_failure(ProviderError::Timeout {
        provider: "primary".to_string(),
    });
    let secondary = Arc::new(MockProvider::new("secondary"));
    secondary.push_failure(ProviderError::Timeout {
        provider: "secondary".to_string(),
    });

    let mut config = DispatcherConfig::default();
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(1);
    config.max_fallback_attempts = 2;

    let d = dispatcher(vec![primary, secondary], config);
    let err = d.dispatch(&request(), Some("primary")).await.unwrap_err();
    assert!(matches!(err, DispatchError::DispatchFailed { .. }));
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_fallback_serves() {
    let primary = Arc::new(MockProvider::new("primary"));
    for _ in 0..10 {
        primary.push_failure(ProviderError::Timeout {
            provider: "primary".to_string(),
        });
    }
    let secondary = Arc::new(MockProvider::new("secondary"));
    for _ in 0..5 {
        secondary.push_result(Ok(CompletionResponse {
            text: "Paris".to_string(),
            prompt_tokens: 10,
            completion_tokens: 3,
        }));
    }

    let mut config = DispatcherConfig::default();
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(1);
    config.breaker.failure_threshold = 2;

    let d = dispatcher(vec![primary, secondary], config);

    d.dispatch(&request(), Some("primary")).await.unwrap();
    d.dispatch(&request(), Some("primary")).await.unwrap();

    assert_eq!(
        d.breaker_state("primary"),
        Some(crate::circuit_breaker::CircuitState::Open)
    );
}

#[tokio::test]
async fn round_robin_cycles_available_providers() {
    let a = Arc::new(MockProvider::new("a"));
    let b = Arc::new(MockProvider::new("b"));
    for _ in 0..4 {
        a.push_result(Ok(CompletionResponse {
            text: "a".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
        }));
        b.push_result(Ok(CompletionResponse {
            text: "b".to_string(),
            prompt_tokens: 1,
            completion_tokens: 1,
        }));
    }

    let mut config = DispatcherConfig::default();
    config.strategy = SelectionStrategy::RoundRobin;

    let d = dispatcher(vec![a, b], config);
    let first = d.dispatch(&request(), None).await.unwrap();
    let second = d.dispatch(&request(), None).await.unwrap();
    assert_ne!(first.response.text, second.response.text);
}

#[tokio::test]
async fn no_providers_registered_errors() {
    let d = dispatcher(vec![], DispatcherConfig::default());
    let err = d.dispatch(&request(), None).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoProviders));
}
