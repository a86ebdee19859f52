//! # semcache
//!
//! A semantic response cache in front of large-language-model providers.
//!
//! A caller submits a query; `semcache` returns either a previously
//! computed answer (exact or semantically similar) or a fresh completion
//! from an upstream provider, storing the new answer for future reuse.
//!
//! ```text
//! Query → Normalize → Validate → Cache lookup (exact, then semantic) → Dispatch → Store
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use semcache::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Vector store at {}", config.vector_url());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `cpu` | CPU-only embedding inference (docs.rs default) |
//! | `metal` | Apple Silicon GPU acceleration |
//! | `cuda` | NVIDIA GPU acceleration |
//! | `mock` | In-memory provider/vector-store doubles for tests and examples |
//!
//! ## Modules
//!
//! - [`cache`] - two-tier similarity cache (exact + semantic) with adaptive threshold and eviction
//! - [`circuit_breaker`] - per-provider Closed/Open/Half-Open state machine
//! - [`config`] - environment-backed configuration
//! - [`context`] - request context propagated through the pipeline
//! - [`cost`] - per-model pricing table and append-only cost ledger
//! - [`dispatcher`] - provider selection, execution, and typed fallback
//! - [`embedding`] - text embedding with LRU cache and batch coalescing
//! - [`error`] - error taxonomy and recovery-action mapping
//! - [`fingerprint`] - query normalization and fingerprinting
//! - [`pipeline`] - the query pipeline tying the above together
//! - [`pool`] - bounded vector-store connection pool
//! - [`provider`] - upstream LLM provider abstraction
//! - [`rate_limiter`] - per-provider sliding-window rate limiter
//! - [`retry`] - retryability classification and backoff scheduling
//! - [`vectordb`] - vector-store client and wire types
//!
//! Links: repo/issues at the crate `repository` URL.

#![warn(rustdoc::missing_crate_level_docs)]

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod constants;
pub mod context;
pub mod cost;
pub mod dispatcher;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod vectordb;

pub use cache::{CacheConfig, CacheEntry, CacheKind, CacheStats, LookupResult, SimilarityCache};
pub use circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use config::{Config, ConfigError};
pub use context::RequestContext;
pub use cost::{CostEntry, CostTracker, Pricing};
pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig, SelectionStrategy};
pub use embedding::{Embedder, EmbedderConfig, EmbeddingError, SinterConfig, SinterEmbedder};
pub use error::{ErrorKind, PipelineError, RecoveryAction, recovery_action};
pub use fingerprint::{fingerprint, normalize};
pub use pipeline::{
    CacheKindLabel, PipelineConfig, PipelineStep, Query, QueryPipeline, QueryResponse,
    StageFailure,
};
pub use pool::{Connector, Pool, PoolConfig, PoolError, PooledConnection};
pub use provider::{
    CompletionRequest, CompletionResponse, GenAiProvider, OpenAiProvider, Provider, ProviderError,
};
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use retry::{RetryConfig, retry};
pub use vectordb::{
    DEFAULT_COLLECTION_NAME, QdrantClient, QdrantConnector, VectorDbClient, VectorDbError,
};

#[cfg(any(test, feature = "mock"))]
pub use provider::MockProvider;
#[cfg(any(test, feature = "mock"))]
pub use vectordb::{MockConnector, MockVectorDbClient};
