//! Provider selection, execution, and typed fallback.
//!
//! Holds a registry of named providers plus one [`CircuitBreaker`] per
//! provider. `dispatch` runs the rate limiter, retry handler, and breaker
//! around a single provider call; on a recoverable failure it walks the
//! remaining providers in declared order, retrying the whole wrapped call
//! against each, bounded by `max_fallback_attempts`.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::circuit_breaker::{BreakerConfig, BreakerOutcome, CircuitBreaker};
use crate::cost::CostTracker;
use crate::provider::{CompletionRequest, CompletionResponse, Provider, ProviderError};
use crate::rate_limiter::RateLimiter;
use crate::retry::{self, RetryConfig};

/// Pluggable choice of which provider to try first.
///
/// A closed-set decision (only two strategies are required by spec), so it
/// is a tagged enum rather than a trait object — the dispatcher's own
/// `dispatch` is the open extension point when a new strategy shows up, per
/// the "closed set → enum, open set → trait" split in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Prefer the caller's requested provider; fall back to the first
    /// available provider in declared order.
    Preferred,
    /// Cycle through available providers, advancing by one per call.
    RoundRobin,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub strategy: SelectionStrategy,
    pub max_fallback_attempts: u32,
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            strategy: SelectionStrategy::Preferred,
            max_fallback_attempts: 3,
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Every provider in the fallback chain was exhausted; carries the
    /// last underlying error observed.
    #[error("all providers failed, last error: {source}")]
    DispatchFailed {
        #[source]
        source: ProviderError,
    },

    /// No providers are registered at all.
    #[error("no providers registered")]
    NoProviders,
}

struct Registered {
    provider: Arc<dyn Provider>,
    breaker: CircuitBreaker,
}

/// What a successful [`Dispatcher::dispatch`] actually did: which provider
/// served the call (not necessarily the one requested, once fallback has
/// walked past it) and the cost already recorded for it, so the caller
/// never needs to record cost a second time.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub response: CompletionResponse,
    pub provider: String,
    pub cost_usd: f64,
}

/// Selects a provider, runs its call through rate limiting, retry, and a
/// breaker, and records cost on success. Providers are held behind a trait
/// object since the set of providers is open (new backends register at
/// runtime), unlike the closed error-kind taxonomy in [`crate::retry`].
pub struct Dispatcher {
    providers: Vec<Registered>,
    order: HashMap<String, usize>,
    config: DispatcherConfig,
    rate_limiter: Arc<RateLimiter>,
    cost_tracker: Arc<CostTracker>,
    round_robin_index: AtomicUsize,
}

impl Dispatcher {
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        config: DispatcherConfig,
        rate_limiter: Arc<RateLimiter>,
        cost_tracker: Arc<CostTracker>,
    ) -> Self {
        let mut order = HashMap::new();
        let registered = providers
            .into_iter()
            .enumerate()
            .map(|(i, provider)| {
                order.insert(provider.name().to_string(), i);
                Registered {
                    provider,
                    breaker: CircuitBreaker::new(config.breaker.clone()),
                }
            })
            .collect();

        Self {
            providers: registered,
            order,
            config,
            rate_limiter,
            cost_tracker,
            round_robin_index: AtomicUsize::new(0),
        }
    }

    fn is_available(&self, idx: usize) -> bool {
        self.providers[idx].breaker.state() != crate::circuit_breaker::CircuitState::Open
    }

    /// Picks a provider index per the configured strategy. `preferred`
    /// names the caller's requested provider, if any; only consulted under
    /// [`SelectionStrategy::Preferred`].
    fn select(&self, preferred: Option<&str>) -> Option<usize> {
        if self.providers.is_empty() {
            return None;
        }

        match self.config.strategy {
            SelectionStrategy::Preferred => {
                if let Some(name) = preferred {
                    if let Some(&idx) = self.order.get(name) {
                        if self.is_available(idx) {
                            return Some(idx);
                        }
                    }
                }
                (0..self.providers.len()).find(|&idx| self.is_available(idx))
            }
            SelectionStrategy::RoundRobin => {
                let n = self.providers.len();
                for _ in 0..n {
                    let idx = self.round_robin_index.fetch_add(1, Ordering::Relaxed) % n;
                    if self.is_available(idx) {
                        return Some(idx);
                    }
                }
                None
            }
        }
    }

    /// Fallback order starting just after `start`, wrapping once through
    /// every other registered provider.
    fn fallback_order(&self, start: usize) -> Vec<usize> {
        let n = self.providers.len();
        (1..n).map(|offset| (start + offset) % n).collect()
    }

    async fn call_through_breaker(
        &self,
        idx: usize,
        request: &CompletionRequest,
    ) -> Result<DispatchOutcome, ProviderError> {
        let registered = &self.providers[idx];
        self.rate_limiter.acquire(registered.provider.name()).await;

        let outcome = registered
            .breaker
            .execute(|| retry::retry(&self.config.retry, || registered.provider.complete(request)))
            .await;

        match outcome {
            Ok(response) => {
                let cost_usd = self.cost_tracker.track_request(
                    registered.provider.name(),
                    &request.model,
                    response.prompt_tokens,
                    response.completion_tokens,
                );
                Ok(DispatchOutcome {
                    response,
                    provider: registered.provider.name().to_string(),
                    cost_usd,
                })
            }
            Err(BreakerOutcome::Open(_)) => {
                warn!(provider = registered.provider.name(), "circuit open, rejecting call");
                Err(ProviderError::RequestFailed {
                    provider: registered.provider.name().to_string(),
                    message: "circuit open".to_string(),
                })
            }
            Err(BreakerOutcome::Inner(err)) => Err(err),
        }
    }

    /// Selects a provider, executes the call, and on a recoverable failure
    /// walks the fallback chain. Total attempts across the chain (including
    /// the first) are bounded by `max_fallback_attempts`. Cost is recorded
    /// exactly once, against whichever provider actually served the call —
    /// callers must not record cost again for the returned outcome.
    pub async fn dispatch(
        &self,
        request: &CompletionRequest,
        preferred: Option<&str>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let first = self.select(preferred).ok_or(DispatchError::NoProviders)?;

        let mut attempts = 1u32;
        let mut last_err = match self.call_through_breaker(first, request).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };

        for idx in self.fallback_order(first) {
            if attempts >= self.config.max_fallback_attempts {
                break;
            }
            if !self.is_available(idx) {
                continue;
            }
            debug!(
                provider = self.providers[idx].provider.name(),
                attempts, "falling back to next provider"
            );
            attempts += 1;
            match self.call_through_breaker(idx, request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => last_err = e,
            }
        }

        Err(DispatchError::DispatchFailed { source: last_err })
    }

    pub fn breaker_state(&self, provider: &str) -> Option<crate::circuit_breaker::CircuitState> {
        self.order.get(provider).map(|&idx| self.providers[idx].breaker.state())
    }
}
