use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::cache::{CacheConfig, SimilarityCache};
use crate::cost::CostTracker;
use crate::dispatcher::{Dispatcher, DispatcherConfig};
use crate::embedding::{Embedder, EmbedderConfig, SinterConfig, SinterEmbedder};
use crate::pool::{Pool, PoolConfig};
use crate::provider::{CompletionResponse, MockProvider, Provider};
use crate::rate_limiter::{RateLimiter, RateLimiterConfig};
use crate::vectordb::MockConnector;

async fn build_pipeline(primary: Arc<MockProvider>) -> QueryPipeline<MockConnector> {
    let connector = MockConnector::new();
    let pool = Pool::connect(connector, PoolConfig::default()).await.unwrap();
    let embedder = Arc::new(Embedder::new(
        SinterEmbedder::load(SinterConfig::stub()).unwrap(),
        EmbedderConfig::default(),
    ));
    let cache_config = CacheConfig {
        vector_size: embedder.dimension() as u64,
        min_lookups_before_tuning: 0,
        tuning_window: 1,
        ..CacheConfig::default()
    };
    let cache = Arc::new(
        SimilarityCache::new(pool, embedder, cache_config)
            .await
            .unwrap(),
    );

    let providers: Vec<Arc<dyn Provider>> = vec![primary];
    let dispatcher = Arc::new(Dispatcher::new(
        providers,
        DispatcherConfig::default(),
        Arc::new(RateLimiter::new(RateLimiterConfig {
            default_requests_per_minute: 1_000,
            ..Default::default()
        })),
        Arc::new(CostTracker::new()),
    ));

    QueryPipeline::new(
        cache,
        dispatcher,
        Arc::new(CostTracker::new()),
        PipelineConfig::default(),
    )
}

#[tokio::test]
async fn cold_miss_then_exact_hit() {
    let primary = Arc::new(MockProvider::new("openai"));
    // Cache-worthy on its own (spec §4.1's token floor), so the first,
    // first-ever-seen occurrence is stored without relying on the
    // frequency-floor clause.
    primary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 100,
    }));

    let pipeline = build_pipeline(primary).await;

    let mut q = Query::new("What is the capital of France?");
    q.provider = Some("openai".to_string());
    q.model = Some("gpt-3.5-turbo".to_string());

    let (first, failures) = pipeline.run(q.clone(), RequestContext::new()).await.unwrap();
    assert!(failures.is_empty());
    assert!(!first.from_cache);
    assert!(matches!(first.cache_kind, CacheKindLabel::None));
    assert_eq!(first.total_tokens, 110);
    assert!(first.cost_usd > 0.0);

    let (second, _) = pipeline.run(q, RequestContext::new()).await.unwrap();
    assert!(second.from_cache);
    assert!(matches!(second.cache_kind, CacheKindLabel::Exact));
    assert_eq!(second.content, "Paris");
}

#[tokio::test]
async fn whitespace_and_case_variants_hit_the_same_fingerprint() {
    let primary = Arc::new(MockProvider::new("openai"));
    primary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 100,
    }));

    let pipeline = build_pipeline(primary).await;

    let mut first_query = Query::new("What is the capital of France?");
    first_query.provider = Some("openai".to_string());
    pipeline
        .run(first_query, RequestContext::new())
        .await
        .unwrap();

    let mut second_query = Query::new(" what is the CAPITAL of france? ");
    second_query.provider = Some("openai".to_string());
    let (response, _) = pipeline.run(second_query, RequestContext::new()).await.unwrap();
    assert!(response.from_cache);
    assert!(matches!(response.cache_kind, CacheKindLabel::Exact));
}

#[tokio::test]
async fn validation_fault_surfaces_immediately() {
    let primary = Arc::new(MockProvider::new("openai"));
    let pipeline = build_pipeline(primary).await;

    let query = Query::new("");
    let err = pipeline.run(query, RequestContext::new()).await.unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::ValidationFault);
}

#[tokio::test]
async fn expired_deadline_is_cancelled_without_dispatch() {
    let primary = Arc::new(MockProvider::new("openai"));
    let pipeline = build_pipeline(primary).await;

    let ctx = RequestContext::with_timeout(Duration::from_millis(0));
    tokio::time::sleep(Duration::from_millis(5)).await;

    let query = Query::new("hello there");
    let err = pipeline.run(query, ctx).await.unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Cancelled);
}

#[tokio::test]
async fn concurrent_identical_misses_coalesce_into_one_dispatch() {
    let primary = Arc::new(MockProvider::new("openai"));
    primary.set_delay(Duration::from_millis(50));
    primary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 200,
    }));

    let pipeline = Arc::new(build_pipeline(Arc::clone(&primary)).await);

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            let mut q = Query::new("What is the capital of France?");
            q.provider = Some("openai".to_string());
            tokio::spawn(async move { pipeline.run(q, RequestContext::new()).await.unwrap() })
        })
        .collect();

    let results = futures::future::join_all(handles).await;
    for result in results {
        let (response, _) = result.unwrap();
        assert_eq!(response.content, "Paris");
    }

    assert_eq!(primary.calls(), 1, "concurrent identical misses should dispatch once");
}

#[tokio::test]
async fn response_names_the_provider_that_actually_served_it() {
    let primary = Arc::new(MockProvider::new("primary"));
    primary.push_failure(crate::provider::ProviderError::Timeout {
        provider: "primary".to_string(),
    });
    let secondary = Arc::new(MockProvider::new("secondary"));
    secondary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 3,
    }));

    let connector = MockConnector::new();
    let pool = Pool::connect(connector, PoolConfig::default()).await.unwrap();
    let embedder = Arc::new(Embedder::new(
        SinterEmbedder::load(SinterConfig::stub()).unwrap(),
        EmbedderConfig::default(),
    ));
    let cache_config = CacheConfig {
        vector_size: embedder.dimension() as u64,
        min_lookups_before_tuning: 0,
        tuning_window: 1,
        ..CacheConfig::default()
    };
    let cache = Arc::new(
        SimilarityCache::new(pool, embedder, cache_config)
            .await
            .unwrap(),
    );

    let providers: Vec<Arc<dyn Provider>> = vec![primary, secondary];
    let mut dispatcher_config = DispatcherConfig::default();
    dispatcher_config.retry.max_attempts = 1;
    dispatcher_config.retry.initial_delay = Duration::from_millis(1);
    let dispatcher = Arc::new(Dispatcher::new(
        providers,
        dispatcher_config,
        Arc::new(RateLimiter::new(RateLimiterConfig {
            default_requests_per_minute: 1_000,
            ..Default::default()
        })),
        Arc::new(CostTracker::new()),
    ));

    let pipeline = QueryPipeline::new(
        cache,
        dispatcher,
        Arc::new(CostTracker::new()),
        PipelineConfig::default(),
    );

    let mut q = Query::new("What is the capital of France?");
    q.provider = Some("primary".to_string());
    let (response, _) = pipeline.run(q, RequestContext::new()).await.unwrap();

    assert_eq!(response.provider, "secondary");
    assert!(response.cost_usd > 0.0);
}

#[tokio::test]
async fn deadline_expiring_mid_dispatch_cancels_the_call() {
    let primary = Arc::new(MockProvider::new("openai"));
    primary.set_delay(Duration::from_millis(100));
    primary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 3,
    }));

    let pipeline = build_pipeline(primary).await;

    let mut q = Query::new("What is the capital of France?");
    q.provider = Some("openai".to_string());

    let ctx = RequestContext::with_timeout(Duration::from_millis(10));
    let err = pipeline.run(q, ctx).await.unwrap_err();
    assert_eq!(err.kind, crate::error::ErrorKind::Cancelled);
}

#[tokio::test]
async fn invalidate_then_lookup_is_a_miss() {
    let primary = Arc::new(MockProvider::new("openai"));
    primary.push_result(Ok(CompletionResponse {
        text: "Paris".to_string(),
        prompt_tokens: 10,
        completion_tokens: 200,
    }));
    primary.push_result(Ok(CompletionResponse {
        text: "Paris again".to_string(),
        prompt_tokens: 10,
        completion_tokens: 200,
    }));

    let pipeline = build_pipeline(primary).await;

    let mut q = Query::new("What is the capital of France?");
    q.provider = Some("openai".to_string());
    pipeline.run(q.clone(), RequestContext::new()).await.unwrap();

    let fp = crate::fingerprint::fingerprint("What is the capital of France?");
    pipeline.cache().invalidate(&fp).await;

    let (response, _) = pipeline.run(q, RequestContext::new()).await.unwrap();
    assert!(!response.from_cache);
}
