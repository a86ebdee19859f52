//! The query pipeline: normalize → validate → cache-lookup → dispatch-and-store.
//!
//! A composable sequence of [`PipelineStep`]s, matching the open-extension
//! treatment the design notes reserve for providers and strategies — custom
//! steps are an explicit extension point in the spec, so steps dispatch
//! through `Vec<Box<dyn PipelineStep>>` rather than a closed enum.

mod steps;
#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::{CacheKind, SimilarityCache};
use crate::context::RequestContext;
use crate::cost::CostTracker;
use crate::dispatcher::Dispatcher;
use crate::error::{ErrorKind, PipelineError};
use crate::fingerprint::fingerprint;
use crate::pool::Connector;
use crate::vectordb::VectorDbClient;

/// Number of trailing subscribers a single-flight broadcast channel can hold
/// before the oldest unread result is dropped. Followers join while the
/// leader's dispatch is still in flight, so in practice there is exactly one
/// send per channel; a small lag buffer just keeps a slow subscriber from
/// panicking on `RecvError::Lagged`.
const SINGLE_FLIGHT_CHANNEL_CAPACITY: usize = 4;

/// Caller-supplied request shape (spec §6).
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub use_exact: bool,
    pub use_semantic: bool,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider: None,
            model: None,
            max_tokens: None,
            temperature: None,
            use_exact: true,
            use_semantic: true,
        }
    }
}

/// Response shape (spec §6).
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub content: String,
    pub from_cache: bool,
    pub cache_kind: CacheKindLabel,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKindLabel {
    Exact,
    Semantic,
    None,
}

impl From<CacheKind> for CacheKindLabel {
    fn from(k: CacheKind) -> Self {
        match k {
            CacheKind::Exact => CacheKindLabel::Exact,
            CacheKind::Semantic => CacheKindLabel::Semantic,
        }
    }
}

/// Intermediate state threaded through every pipeline step.
#[derive(Debug, Clone, Default)]
pub struct Intermediate {
    pub normalized_text: Option<String>,
    pub response: Option<QueryResponse>,
}

/// A single custom pipeline stage: transforms `(query, intermediate)`,
/// optionally failing. Held as `Box<dyn PipelineStep>` since custom steps
/// are an open extension point (spec §4.9), so the trait goes through
/// `async-trait` for the same object-safety reason as [`crate::provider::Provider`].
#[async_trait::async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    /// `true` if a failure in this step should abort the whole run
    /// (subject to the pipeline's `continue_on_error` override).
    fn fatal_on_error(&self) -> bool {
        true
    }

    async fn call(
        &self,
        query: &Query,
        ctx: &RequestContext,
        state: Intermediate,
    ) -> Result<Intermediate, PipelineError>;
}

/// Failed stages recorded when `continue_on_error` is set.
#[derive(Debug, Clone)]
pub struct StageFailure {
    pub step: String,
    pub error: PipelineError,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub parallel_timeout: Duration,
    pub continue_on_error: bool,
    pub latency_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel_timeout: Duration::from_millis(500),
            continue_on_error: false,
            latency_window: 1000,
        }
    }
}

/// Rolling window of the last N end-to-end latencies, for diagnostics.
struct LatencyWindow {
    capacity: usize,
    samples: VecDeque<Duration>,
}

impl LatencyWindow {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, d: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(d);
    }

    fn mean_ms(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let total: f64 = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        total / self.samples.len() as f64
    }
}

/// Steps executed for one query run, plus per-run result bookkeeping that
/// doesn't belong on an individual [`PipelineStep`] (dispatch-and-store's
/// success path needs the cache, the dispatcher, and the cost tracker all
/// at once, so they are wired directly into [`QueryPipeline::run`] rather
/// than threaded through `Intermediate`).
pub struct QueryPipeline<C: Connector>
where
    C::Conn: VectorDbClient,
{
    cache: Arc<SimilarityCache<C>>,
    dispatcher: Arc<Dispatcher>,
    cost_tracker: Arc<CostTracker>,
    custom_steps: Vec<Box<dyn PipelineStep>>,
    config: PipelineConfig,
    latencies: Mutex<LatencyWindow>,
    // Single-flight: concurrent misses on the same fingerprint join the
    // in-flight dispatch rather than each calling the provider. The leader
    // removes its own entry once it has broadcast the result, so moka's
    // eviction policy is irrelevant here — this is a short-lived rendezvous
    // map, not a cache.
    in_flight: moka::sync::Cache<String, broadcast::Sender<Result<QueryResponse, PipelineError>>>,
}

impl<C: Connector> QueryPipeline<C>
where
    C::Conn: VectorDbClient,
{
    pub fn new(
        cache: Arc<SimilarityCache<C>>,
        dispatcher: Arc<Dispatcher>,
        cost_tracker: Arc<CostTracker>,
        config: PipelineConfig,
    ) -> Self {
        let window = config.latency_window;
        Self {
            cache,
            dispatcher,
            cost_tracker,
            custom_steps: Vec::new(),
            config,
            latencies: Mutex::new(LatencyWindow::new(window)),
            in_flight: moka::sync::Cache::builder()
                .max_capacity(10_000)
                .build(),
        }
    }

    /// Inserts an extra step, run after cache-lookup and before
    /// dispatch-and-store. Extension point called out in spec §4.9.
    pub fn with_custom_step(mut self, step: Box<dyn PipelineStep>) -> Self {
        self.custom_steps.push(step);
        self
    }

    pub fn mean_latency_ms(&self) -> f64 {
        self.latencies.lock().mean_ms()
    }

    /// The underlying cache, exposed for direct `invalidate`/`stats` calls
    /// outside a full pipeline run.
    pub fn cache(&self) -> &Arc<SimilarityCache<C>> {
        &self.cache
    }

    /// The cost ledger shared with the dispatcher, exposed for aggregate
    /// reporting (totals, per-provider/per-model sums) outside a run.
    pub fn cost_tracker(&self) -> &Arc<CostTracker> {
        &self.cost_tracker
    }

    /// Runs one query through the full pipeline: normalize, validate, try
    /// the cache, and on miss dispatch to an upstream provider and store
    /// the result. Returns the accumulated stage failures alongside the
    /// response when `continue_on_error` allows a failed non-fatal step to
    /// be skipped.
    pub async fn run(
        &self,
        query: Query,
        ctx: RequestContext,
    ) -> Result<(QueryResponse, Vec<StageFailure>), PipelineError> {
        let start = Instant::now();
        let mut failures = Vec::new();

        let normalized = match steps::normalize(&query) {
            Ok(text) => text,
            Err(e) => return Err(e),
        };

        if let Err(e) = steps::validate(&query, &normalized) {
            return Err(e);
        }

        if ctx.is_expired() {
            return Err(PipelineError::new(ErrorKind::Cancelled, "deadline already passed"));
        }

        if let Some(mut response) = self.try_cache(&query, &normalized, &ctx).await {
            let elapsed = start.elapsed();
            response.latency_ms = elapsed.as_millis() as u64;
            self.record_latency(elapsed);
            return Ok((response, failures));
        }

        for step in &self.custom_steps {
            let state = Intermediate {
                normalized_text: Some(normalized.clone()),
                response: None,
            };
            match step.call(&query, &ctx, state).await {
                Ok(_) => {}
                Err(e) => {
                    if step.fatal_on_error() && !self.config.continue_on_error {
                        return Err(e);
                    }
                    warn!(step = step.name(), error = %e, "custom step failed, continuing");
                    failures.push(StageFailure {
                        step: step.name().to_string(),
                        error: e,
                    });
                }
            }
        }

        let mut response = self
            .dispatch_and_store_deadline_aware(&query, &normalized, &ctx)
            .await?;
        let elapsed = start.elapsed();
        response.latency_ms = elapsed.as_millis() as u64;
        self.record_latency(elapsed);
        Ok((response, failures))
    }

    /// Coalesces concurrent misses on the same fingerprint into a single
    /// upstream dispatch. The first caller to arrive becomes the leader and
    /// runs [`Self::dispatch_and_store`]; later callers for the same
    /// fingerprint subscribe to the leader's result instead of dispatching
    /// again. A follower that sees a dropped channel (leader panicked) or
    /// lags off the back of the buffer falls through and dispatches itself.
    async fn dispatch_and_store_single_flight(
        &self,
        query: &Query,
        normalized: &str,
    ) -> Result<QueryResponse, PipelineError> {
        let key = fingerprint(normalized);

        let (tx, is_leader) = match self.in_flight.get(&key) {
            Some(tx) => (tx, false),
            None => {
                let (tx, _rx) = broadcast::channel(SINGLE_FLIGHT_CHANNEL_CAPACITY);
                self.in_flight.insert(key.clone(), tx.clone());
                (tx, true)
            }
        };

        if !is_leader {
            let mut rx = tx.subscribe();
            match rx.recv().await {
                Ok(result) => return result,
                Err(_) => {
                    debug!(fingerprint = key, "single-flight follower fell through, dispatching");
                }
            }
        }

        let result = self.dispatch_and_store(query, normalized).await;
        if is_leader {
            self.in_flight.invalidate(&key);
            let _ = tx.send(result.clone());
        }
        result
    }

    /// Launches exact and semantic lookups as concurrent tasks per spec
    /// §4.9: the semantic task is raced against `parallel_timeout` and
    /// effectively abandoned (its result ignored) the moment an exact hit
    /// lands, since exact always wins on a tie.
    /// `ctx` is cloned into each spawned sibling task so every concurrent
    /// lookup observes the same request id and deadline (spec §4.11), and
    /// the semantic task's wait is bounded by whichever is tighter: the
    /// pipeline's own `parallel_timeout` or the caller's remaining budget.
    async fn try_cache(
        &self,
        query: &Query,
        normalized: &str,
        ctx: &RequestContext,
    ) -> Option<QueryResponse> {
        if !query.use_exact && !query.use_semantic {
            return None;
        }
        if ctx.is_expired() {
            return None;
        }

        let cache = Arc::clone(&self.cache);
        let text = normalized.to_string();
        let use_exact = query.use_exact;
        let use_semantic = query.use_semantic;

        if use_exact && use_semantic {
            // Raced concurrently via the tier-only accessors, not the
            // composite `lookup()`: calling `lookup()` once per tier here
            // would run `record_lookup` twice for the same logical query,
            // double-counting frequency and hit/miss stats. The combined
            // outcome is recorded exactly once below, after the race
            // resolves.
            let exact_cache = Arc::clone(&cache);
            let exact_text = text.clone();
            let exact_ctx = ctx.clone();
            let exact_task = tokio::spawn(async move {
                if exact_ctx.is_expired() {
                    return None;
                }
                exact_cache.exact_tier(&exact_text).await
            });

            let semantic_cache = Arc::clone(&cache);
            let semantic_text = text.clone();
            let semantic_ctx = ctx.clone();
            let semantic_task = tokio::spawn(async move {
                if semantic_ctx.is_expired() {
                    return None;
                }
                semantic_cache.semantic_tier(&semantic_text).await
            });

            let exact_entry = exact_task.await.ok()?;
            if let Some(entry) = exact_entry {
                semantic_task.abort();
                cache.record_lookup(&text, Some(CacheKind::Exact));
                return lookup_to_response(crate::cache::LookupResult::Hit {
                    entry,
                    kind: CacheKind::Exact,
                });
            }

            let budget = match ctx.remaining() {
                Some(remaining) => remaining.min(self.config.parallel_timeout),
                None => self.config.parallel_timeout,
            };
            let semantic_entry = match tokio::time::timeout(budget, semantic_task).await {
                Ok(Ok(entry)) => entry,
                Ok(Err(_join_err)) => None,
                Err(_timeout) => {
                    debug!("semantic lookup exceeded parallel_timeout, treating as miss");
                    None
                }
            };

            match semantic_entry {
                Some(entry) => {
                    cache.record_lookup(&text, Some(CacheKind::Semantic));
                    lookup_to_response(crate::cache::LookupResult::Hit {
                        entry,
                        kind: CacheKind::Semantic,
                    })
                }
                None => {
                    cache.record_lookup(&text, None);
                    None
                }
            }
        } else {
            let result = cache.lookup(&text, use_exact, use_semantic).await;
            lookup_to_response(result)
        }
    }

    /// Races dispatch-and-store against the context's remaining deadline
    /// budget, if any, so a caller-imposed deadline bounds the in-flight
    /// provider call (spec §5: "in-flight provider calls SHOULD be
    /// cancelled on deadline expiry") rather than only being checked once at
    /// pipeline entry.
    async fn dispatch_and_store_deadline_aware(
        &self,
        query: &Query,
        normalized: &str,
        ctx: &RequestContext,
    ) -> Result<QueryResponse, PipelineError> {
        match ctx.remaining() {
            Some(remaining) => {
                match tokio::time::timeout(
                    remaining,
                    self.dispatch_and_store_single_flight(query, normalized),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_elapsed) => Err(PipelineError::new(
                        ErrorKind::Cancelled,
                        "deadline expired while dispatching to a provider",
                    )),
                }
            }
            None => self.dispatch_and_store_single_flight(query, normalized).await,
        }
    }

    async fn dispatch_and_store(
        &self,
        query: &Query,
        normalized: &str,
    ) -> Result<QueryResponse, PipelineError> {
        let request = crate::provider::CompletionRequest {
            model: query.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string()),
            prompt: normalized.to_string(),
            max_tokens: query.max_tokens,
            temperature: query.temperature,
        };

        let outcome = self
            .dispatcher
            .dispatch(&request, query.provider.as_deref())
            .await?;
        let response = outcome.response;

        self.cache
            .store(
                normalized,
                &response.text,
                &outcome.provider,
                &request.model,
                response.prompt_tokens,
                response.completion_tokens,
            )
            .await;

        Ok(QueryResponse {
            content: response.text,
            from_cache: false,
            cache_kind: CacheKindLabel::None,
            provider: outcome.provider,
            model: request.model,
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
            total_tokens: response.prompt_tokens + response.completion_tokens,
            cost_usd: outcome.cost_usd,
            latency_ms: 0,
        })
    }

    fn record_latency(&self, d: Duration) {
        self.latencies.lock().push(d);
    }
}

fn lookup_to_response(result: crate::cache::LookupResult) -> Option<QueryResponse> {
    match result {
        crate::cache::LookupResult::Hit { entry, kind } => Some(QueryResponse {
            content: entry.response,
            from_cache: true,
            cache_kind: kind.into(),
            provider: entry.provider,
            model: entry.model,
            prompt_tokens: entry.prompt_tokens,
            completion_tokens: entry.completion_tokens,
            total_tokens: entry.prompt_tokens + entry.completion_tokens,
            cost_usd: 0.0,
            latency_ms: 0,
        }),
        crate::cache::LookupResult::Miss => None,
    }
}
