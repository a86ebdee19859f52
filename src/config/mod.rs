//! Environment-backed configuration, enumerating every field the core
//! components need (spec §6). Loading is infallible defaults plus
//! best-effort env overrides; `validate()` is a separate pass so a caller
//! can construct a `Config` by hand (tests, embedding) without touching the
//! filesystem or environment at all.

pub mod error;


pub use error::ConfigError;

use std::collections::HashMap;
use std::env;
use std::net::IpAddr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::circuit_breaker::BreakerConfig;
use crate::dispatcher::{DispatcherConfig, SelectionStrategy};
use crate::pipeline::PipelineConfig;
use crate::pool::PoolConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryConfig;

/// Connection-pool settings (spec §6 `pool.*`).
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min_size: usize,
    pub max_size: usize,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    pub acquire_timeout: Duration,
}

impl From<&PoolSettings> for PoolConfig {
    fn from(s: &PoolSettings) -> Self {
        PoolConfig {
            min_size: s.min_size,
            max_size: s.max_size,
            idle_timeout: s.idle_timeout,
            max_lifetime: s.max_lifetime,
            acquire_timeout: s.acquire_timeout,
            janitor_interval: crate::pool::DEFAULT_JANITOR_INTERVAL,
        }
    }
}

/// Rate-limiting settings (spec §6 `rate.*`).
#[derive(Debug, Clone)]
pub struct RateSettings {
    pub requests_per_minute: HashMap<String, u32>,
    pub default_requests_per_minute: u32,
}

impl From<&RateSettings> for RateLimiterConfig {
    fn from(s: &RateSettings) -> Self {
        RateLimiterConfig {
            requests_per_minute: s.requests_per_minute.clone(),
            default_requests_per_minute: s.default_requests_per_minute,
        }
    }
}

/// Retry settings (spec §6 `retry.*`).
#[derive(Debug, Clone)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
    pub jitter: bool,
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: s.max_attempts,
            initial_delay: s.initial_delay,
            max_delay: s.max_delay,
            base: s.base,
            jitter: s.jitter,
        }
    }
}

/// Circuit-breaker settings (spec §6 `breaker.*`).
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl From<&BreakerSettings> for BreakerConfig {
    fn from(s: &BreakerSettings) -> Self {
        BreakerConfig {
            failure_threshold: s.failure_threshold,
            recovery_timeout: s.recovery_timeout,
            success_threshold: s.success_threshold,
        }
    }
}

/// Similarity-cache settings (spec §6 `cache.*`).
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_size: usize,
    pub eviction_batch: usize,
    pub initial_threshold: f32,
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub target_hit_rate: f32,
    pub ttl_min: Duration,
    pub ttl_base: Duration,
    pub ttl_max: Duration,
}

/// Pipeline settings (spec §6 `pipeline.*`).
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub parallel_timeout_ms: u64,
    pub continue_on_error: bool,
}

impl From<&PipelineSettings> for PipelineConfig {
    fn from(s: &PipelineSettings) -> Self {
        PipelineConfig {
            parallel_timeout: Duration::from_millis(s.parallel_timeout_ms),
            continue_on_error: s.continue_on_error,
            latency_window: 1000,
        }
    }
}

/// Every field enumerated in spec §6's configuration surface, plus the
/// ambient bind address/port for the smoke-test binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: IpAddr,

    pub embedding_model: String,
    pub embedding_dimension: usize,

    pub vector_host: String,
    pub vector_port: u16,

    pub pool: PoolSettings,
    pub rate: RateSettings,
    pub retry: RetrySettings,
    pub breaker: BreakerSettings,
    pub cache: CacheSettings,
    pub pipeline: PipelineSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),

            embedding_model: "sinter".to_string(),
            embedding_dimension: crate::constants::DEFAULT_EMBEDDING_DIM,

            vector_host: "localhost".to_string(),
            vector_port: 6334,

            pool: PoolSettings {
                min_size: 1,
                max_size: 10,
                idle_timeout: Duration::from_secs(300),
                max_lifetime: Duration::from_secs(3_600),
                acquire_timeout: Duration::from_secs(5),
            },
            rate: RateSettings {
                requests_per_minute: HashMap::new(),
                default_requests_per_minute: 60,
            },
            retry: RetrySettings {
                max_attempts: 3,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(10),
                base: 2.0,
                jitter: true,
            },
            breaker: BreakerSettings {
                failure_threshold: 5,
                recovery_timeout: Duration::from_secs(60),
                success_threshold: 2,
            },
            cache: CacheSettings {
                max_size: 100_000,
                eviction_batch: 100,
                initial_threshold: 0.85,
                min_threshold: 0.70,
                max_threshold: 0.95,
                target_hit_rate: 0.50,
                ttl_min: Duration::from_secs(3_600),
                ttl_base: Duration::from_secs(86_400),
                ttl_max: Duration::from_secs(7 * 86_400),
            },
            pipeline: PipelineSettings {
                parallel_timeout_ms: 500,
                continue_on_error: false,
            },
        }
    }
}

macro_rules! env_parse {
    ($name:expr, $default:expr, $parse:expr) => {
        match env::var($name) {
            Ok(value) => $parse(&value).map_err(|reason: String| ConfigError::InvalidValue {
                name: $name,
                value: value.clone(),
                reason,
            })?,
            Err(_) => $default,
        }
    };
}

impl Config {
    const ENV_PORT: &'static str = "SEMCACHE_PORT";
    const ENV_BIND_ADDR: &'static str = "SEMCACHE_BIND_ADDR";
    const ENV_EMBEDDING_MODEL: &'static str = "SEMCACHE_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIMENSION: &'static str = "SEMCACHE_EMBEDDING_DIMENSION";
    const ENV_VECTOR_HOST: &'static str = "SEMCACHE_VECTOR_HOST";
    const ENV_VECTOR_PORT: &'static str = "SEMCACHE_VECTOR_PORT";
    const ENV_POOL_MAX_SIZE: &'static str = "SEMCACHE_POOL_MAX_SIZE";
    const ENV_POOL_MIN_SIZE: &'static str = "SEMCACHE_POOL_MIN_SIZE";
    const ENV_RATE_DEFAULT_RPM: &'static str = "SEMCACHE_RATE_DEFAULT_RPM";
    const ENV_RETRY_MAX_ATTEMPTS: &'static str = "SEMCACHE_RETRY_MAX_ATTEMPTS";
    const ENV_BREAKER_FAILURE_THRESHOLD: &'static str = "SEMCACHE_BREAKER_FAILURE_THRESHOLD";
    const ENV_CACHE_MAX_SIZE: &'static str = "SEMCACHE_CACHE_MAX_SIZE";
    const ENV_PIPELINE_CONTINUE_ON_ERROR: &'static str = "SEMCACHE_PIPELINE_CONTINUE_ON_ERROR";

    /// Loads configuration from environment variables, falling back to
    /// documented defaults for anything unset. Only values present in the
    /// environment are parsed, so a malformed *unset* variable can never
    /// surface an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env()?.unwrap_or(defaults.port);
        let bind_addr = Self::parse_bind_addr_from_env()?.unwrap_or(defaults.bind_addr);

        let embedding_model =
            env::var(Self::ENV_EMBEDDING_MODEL).unwrap_or(defaults.embedding_model.clone());
        let embedding_dimension = env_parse!(
            Self::ENV_EMBEDDING_DIMENSION,
            defaults.embedding_dimension,
            |v: &str| v.parse::<usize>().map_err(|e| e.to_string())
        );

        let vector_host = env::var(Self::ENV_VECTOR_HOST).unwrap_or(defaults.vector_host.clone());
        let vector_port = env_parse!(Self::ENV_VECTOR_PORT, defaults.vector_port, |v: &str| v
            .parse::<u16>()
            .map_err(|e| e.to_string()));

        let mut pool = defaults.pool.clone();
        pool.max_size = env_parse!(Self::ENV_POOL_MAX_SIZE, pool.max_size, |v: &str| v
            .parse::<usize>()
            .map_err(|e| e.to_string()));
        pool.min_size = env_parse!(Self::ENV_POOL_MIN_SIZE, pool.min_size, |v: &str| v
            .parse::<usize>()
            .map_err(|e| e.to_string()));

        let mut rate = defaults.rate.clone();
        rate.default_requests_per_minute = env_parse!(
            Self::ENV_RATE_DEFAULT_RPM,
            rate.default_requests_per_minute,
            |v: &str| v.parse::<u32>().map_err(|e| e.to_string())
        );

        let mut retry = defaults.retry.clone();
        retry.max_attempts = env_parse!(
            Self::ENV_RETRY_MAX_ATTEMPTS,
            retry.max_attempts,
            |v: &str| v.parse::<u32>().map_err(|e| e.to_string())
        );

        let mut breaker = defaults.breaker.clone();
        breaker.failure_threshold = env_parse!(
            Self::ENV_BREAKER_FAILURE_THRESHOLD,
            breaker.failure_threshold,
            |v: &str| v.parse::<u32>().map_err(|e| e.to_string())
        );

        let mut cache = defaults.cache.clone();
        cache.max_size = env_parse!(Self::ENV_CACHE_MAX_SIZE, cache.max_size, |v: &str| v
            .parse::<usize>()
            .map_err(|e| e.to_string()));

        let mut pipeline = defaults.pipeline.clone();
        pipeline.continue_on_error = env_parse!(
            Self::ENV_PIPELINE_CONTINUE_ON_ERROR,
            pipeline.continue_on_error,
            |v: &str| v.parse::<bool>().map_err(|e| e.to_string())
        );

        Ok(Self {
            port,
            bind_addr,
            embedding_model,
            embedding_dimension,
            vector_host,
            vector_port,
            pool,
            rate,
            retry,
            breaker,
            cache,
            pipeline,
        })
    }

    fn parse_port_from_env() -> Result<Option<u16>, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;
                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }
                Ok(Some(port))
            }
            Err(_) => Ok(None),
        }
    }

    fn parse_bind_addr_from_env() -> Result<Option<IpAddr>, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map(Some)
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(None),
        }
    }

    /// Cross-field bounds not caught by the per-field parsers above: the
    /// threshold ladder must be ordered, the pool floor must not exceed its
    /// ceiling, and the embedding dimension must be positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimension == 0 {
            return Err(ConfigError::OutOfBounds {
                name: "embedding_dimension",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        if self.pool.min_size > self.pool.max_size {
            return Err(ConfigError::OutOfBounds {
                name: "pool.min_size",
                value: self.pool.min_size.to_string(),
                reason: format!("exceeds pool.max_size ({})", self.pool.max_size),
            });
        }

        if self.cache.min_threshold > self.cache.max_threshold {
            return Err(ConfigError::OutOfBounds {
                name: "cache.min_threshold",
                value: self.cache.min_threshold.to_string(),
                reason: format!("exceeds cache.max_threshold ({})", self.cache.max_threshold),
            });
        }

        if !(self.cache.min_threshold..=self.cache.max_threshold)
            .contains(&self.cache.initial_threshold)
        {
            return Err(ConfigError::OutOfBounds {
                name: "cache.initial_threshold",
                value: self.cache.initial_threshold.to_string(),
                reason: format!(
                    "must be within [cache.min_threshold {}, cache.max_threshold {}]",
                    self.cache.min_threshold, self.cache.max_threshold
                ),
            });
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// HTTP URL for the vector store, derived from `vector_host`/`vector_port`.
    pub fn vector_url(&self) -> String {
        format!("http://{}:{}", self.vector_host, self.vector_port)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::from(&self.pool)
    }

    pub fn rate_limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::from(&self.rate)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig::from(&self.breaker)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            collection_name: crate::vectordb::DEFAULT_COLLECTION_NAME.to_string(),
            vector_size: self.embedding_dimension as u64,
            max_cache_size: self.cache.max_size,
            eviction_batch_size: self.cache.eviction_batch,
            initial_threshold: self.cache.initial_threshold,
            min_threshold: self.cache.min_threshold,
            max_threshold: self.cache.max_threshold,
            target_hit_rate: self.cache.target_hit_rate,
            ttl_min: self.cache.ttl_min,
            ttl_base: self.cache.ttl_base,
            ttl_max: self.cache.ttl_max,
            ..CacheConfig::default()
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            strategy: SelectionStrategy::Preferred,
            max_fallback_attempts: 3,
            retry: self.retry_config(),
            breaker: self.breaker_config(),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::from(&self.pipeline)
    }
}
