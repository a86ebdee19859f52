//! Text embedding with an in-process LRU cache and request batching.
//!
//! [`sinter`] is the underlying transformer (or deterministic stub); this
//! module wraps it with the behavior spec'd for the embedder component: a
//! `(normalized text, normalize flag)`-keyed LRU bounded by item count, and
//! a batching wrapper that coalesces concurrent single-text requests into
//! one backend call when `batch_size` requests queue up or `max_wait`
//! elapses since the oldest pending one.

pub mod device;
mod error;
/// Sinter embedder (candle Qwen2, GGUF + tokenizer; stub mode for tests).
pub mod sinter;
pub mod utils;


pub use error::EmbeddingError;
pub use sinter::{SINTER_EMBEDDING_DIM, SINTER_MAX_SEQ_LEN, SinterConfig, SinterEmbedder};

use std::sync::Arc;
use std::time::Duration;

use half::f16;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::fingerprint::normalize;

/// Tuning knobs for the in-process cache and batch coalescer.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    /// Max number of distinct (text, normalize) entries kept in the LRU.
    pub cache_capacity: u64,
    /// Vectors larger than this many KB are never cached.
    pub cache_item_max_size_kb: usize,
    /// Dispatch the pending batch once it reaches this many requests.
    pub batch_size: usize,
    /// Dispatch the pending batch once this long has elapsed since the
    /// oldest request in it, even if `batch_size` hasn't been reached.
    pub max_wait: Duration,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10_000,
            cache_item_max_size_kb: 64,
            batch_size: 16,
            max_wait: Duration::from_millis(10),
        }
    }
}

struct Pending {
    requests: Vec<(String, oneshot::Sender<Result<Vec<f32>, EmbeddingError>>)>,
    generation: u64,
}

/// Embeds text into vectors, caching results and coalescing concurrent
/// single-text calls into backend batches.
pub struct Embedder {
    backend: Arc<SinterEmbedder>,
    cache: moka::sync::Cache<String, Arc<Vec<f16>>>,
    config: EmbedderConfig,
    pending: Arc<Mutex<Option<Pending>>>,
    next_generation: std::sync::atomic::AtomicU64,
}

impl Embedder {
    pub fn new(backend: SinterEmbedder, config: EmbedderConfig) -> Self {
        let cache = moka::sync::Cache::builder()
            .max_capacity(config.cache_capacity)
            .build();
        Self {
            backend: Arc::new(backend),
            cache,
            config,
            pending: Arc::new(Mutex::new(None)),
            next_generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Declared output vector dimension.
    pub fn dimension(&self) -> usize {
        self.backend.embedding_dim()
    }

    fn cache_key(text: &str, normalize_flag: bool) -> String {
        if normalize_flag {
            format!("n:{}", normalize(text))
        } else {
            format!("r:{text}")
        }
    }

    /// Embeds `text`, applying [`crate::fingerprint::normalize`] first when
    /// `normalize_flag` is set. Served from the LRU cache on repeat calls;
    /// otherwise queued into the current batch and dispatched per
    /// [`EmbedderConfig::batch_size`] / [`EmbedderConfig::max_wait`].
    pub async fn embed(
        &self,
        text: &str,
        normalize_flag: bool,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let key = Self::cache_key(text, normalize_flag);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.iter().map(|v| v.to_f32()).collect());
        }

        let lookup_text = if normalize_flag {
            normalize(text)
        } else {
            text.to_string()
        };

        let (tx, rx) = oneshot::channel();
        let should_flush_immediately = {
            let mut guard = self.pending.lock();
            let pending = guard.get_or_insert_with(|| Pending {
                requests: Vec::new(),
                generation: self
                    .next_generation
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            });
            pending.requests.push((lookup_text, tx));
            let is_first = pending.requests.len() == 1;
            let at_capacity = pending.requests.len() >= self.config.batch_size;

            if is_first && !at_capacity {
                self.schedule_flush(pending.generation);
            }
            at_capacity
        };

        if should_flush_immediately {
            self.flush().await;
        }

        let vector = rx
            .await
            .map_err(|_| EmbeddingError::InferenceFailed {
                reason: "embedding batch dropped before completion".to_string(),
            })??;
        self.maybe_cache(&key, &vector);
        Ok(vector)
    }

    /// Embeds a batch of texts in one backend call, bypassing the
    /// coalescing queue (and the cache, since callers supplying a batch
    /// already know they want fresh work done).
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let backend = Arc::clone(&self.backend);
        let owned: Vec<String> = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
            backend.embed_batch(&refs).map(|vs| {
                vs.into_iter()
                    .map(|v| v.iter().map(|x| x.to_f32()).collect())
                    .collect()
            })
        })
        .await
        .map_err(|e| EmbeddingError::InferenceFailed {
            reason: format!("embed_batch task panicked: {e}"),
        })?
    }

    fn schedule_flush(&self, generation: u64) {
        let pending = Arc::clone(&self.pending);
        let backend = Arc::clone(&self.backend);
        let max_wait = self.config.max_wait;
        tokio::spawn(async move {
            tokio::time::sleep(max_wait).await;
            let batch = {
                let mut guard = pending.lock();
                match guard.as_ref() {
                    Some(p) if p.generation == generation => guard.take(),
                    _ => None,
                }
            };
            if let Some(batch) = batch {
                dispatch_batch(&backend, batch).await;
            }
        });
    }

    async fn flush(&self) {
        let batch = self.pending.lock().take();
        if let Some(batch) = batch {
            dispatch_batch(&self.backend, batch).await;
        }
    }

    fn maybe_cache(&self, key: &str, vector: &[f32]) {
        let size_kb = (vector.len() * std::mem::size_of::<f16>()) / 1024;
        if size_kb > self.config.cache_item_max_size_kb {
            debug!(size_kb, "embedding too large to cache");
            return;
        }
        let packed: Vec<f16> = vector.iter().map(|v| f16::from_f32(*v)).collect();
        self.cache.insert(key.to_string(), Arc::new(packed));
    }
}

async fn dispatch_batch(backend: &Arc<SinterEmbedder>, batch: Pending) {
    let backend = Arc::clone(backend);
    let texts: Vec<String> = batch.requests.iter().map(|(t, _)| t.clone()).collect();
    let result = tokio::task::spawn_blocking(move || {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        backend.embed_batch(&refs)
    })
    .await;

    match result {
        Ok(Ok(vectors)) => {
            for ((_, tx), vector) in batch.requests.into_iter().zip(vectors.into_iter()) {
                let _ = tx.send(Ok(vector.iter().map(|v| v.to_f32()).collect()));
            }
        }
        Ok(Err(e)) => {
            warn!(error = %e, "embedding batch failed");
            let message = e.to_string();
            for (_, tx) in batch.requests {
                let _ = tx.send(Err(EmbeddingError::InferenceFailed {
                    reason: message.clone(),
                }));
            }
        }
        Err(join_err) => {
            for (_, tx) in batch.requests {
                let _ = tx.send(Err(EmbeddingError::InferenceFailed {
                    reason: format!("embedding batch task panicked: {join_err}"),
                }));
            }
        }
    }
}
