//! Two-tier similarity cache: exact fingerprint lookup backed by a
//! get-by-id, falling back to adaptive-threshold vector search.
//!
//! Every failure mode described in the spec degrades to a miss rather than
//! an error: an embedder fault downgrades a lookup to exact-only, a
//! vector-store read fault is a miss, a vector-store write fault is logged
//! and swallowed. `lookup`/`store` are therefore infallible from the
//! caller's perspective — there is nothing for the pipeline to recover
//! from, because the cache already recovered.


use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::fingerprint::fingerprint;
use crate::pool::{Connector, Pool};
use crate::vectordb::{VectorDbClient, VectorPoint};

/// A materialized cache entry, reconstructed either from an exact get-by-id
/// or from a semantic search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub original_query: String,
    pub response: String,
    pub provider: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub created_at: i64,
    pub last_accessed: i64,
    pub access_count: u32,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        now - self.created_at >= self.ttl.as_secs() as i64
    }
}

/// Which tier served a [`LookupResult::Hit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Exact,
    Semantic,
}

#[derive(Debug, Clone)]
pub enum LookupResult {
    Hit { entry: CacheEntry, kind: CacheKind },
    Miss,
}

impl LookupResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, LookupResult::Hit { .. })
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub collection_name: String,
    pub vector_size: u64,
    pub max_cache_size: usize,
    pub eviction_batch_size: usize,
    pub initial_threshold: f32,
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub target_hit_rate: f32,
    pub tolerance: f32,
    pub tuning_window: u64,
    pub min_lookups_before_tuning: u64,
    pub ttl_min: Duration,
    pub ttl_base: Duration,
    pub ttl_max: Duration,
    pub cache_worthy_token_floor: u32,
    pub frequency_store_floor: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            collection_name: crate::vectordb::DEFAULT_COLLECTION_NAME.to_string(),
            vector_size: crate::constants::DEFAULT_VECTOR_SIZE_U64,
            max_cache_size: 100_000,
            eviction_batch_size: 100,
            initial_threshold: 0.85,
            min_threshold: 0.70,
            max_threshold: 0.95,
            target_hit_rate: 0.50,
            tolerance: 0.05,
            tuning_window: 50,
            min_lookups_before_tuning: 100,
            ttl_min: Duration::from_secs(3_600),
            ttl_base: Duration::from_secs(86_400),
            ttl_max: Duration::from_secs(7 * 86_400),
            cache_worthy_token_floor: 100,
            frequency_store_floor: 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub lookups: u64,
    pub exact_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub current_threshold: f32,
    pub tracked_population: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f32 {
        if self.lookups == 0 {
            return 0.0;
        }
        (self.exact_hits + self.semantic_hits) as f32 / self.lookups as f32
    }
}

struct ThresholdState {
    current: f32,
    exact_hits: u64,
    semantic_hits: u64,
    misses: u64,
    lookups_since_tune: u64,
}

#[derive(Clone, Copy)]
struct FreqMeta {
    count: u32,
    last_seen: i64,
}

#[derive(Clone, Copy)]
struct EvictionMeta {
    access_count: u32,
    last_accessed: i64,
    created_at: i64,
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The two-tier cache. Generic over a pooled vector-store connector, the
/// same way the dispatcher and query pipeline take their collaborators by
/// type parameter rather than by trait object, since the concrete backend
/// is fixed for the lifetime of one cache instance.
pub struct SimilarityCache<C: Connector>
where
    C::Conn: VectorDbClient,
{
    pool: Pool<C>,
    embedder: std::sync::Arc<Embedder>,
    config: CacheConfig,
    threshold: Mutex<ThresholdState>,
    // Frequency-by-fingerprint, bounded at 2x max_cache_size: used for the
    // store-worthiness and TTL-tier heuristics, not for correctness.
    frequency: Mutex<HashMap<String, FreqMeta>>,
    // Access-recency index used only to score eviction candidates; the
    // vector store itself has no cheap "list all points sorted by access"
    // operation, so this is kept alongside it.
    eviction_index: Mutex<HashMap<String, EvictionMeta>>,
}

impl<C: Connector> SimilarityCache<C>
where
    C::Conn: VectorDbClient,
{
    pub async fn new(
        pool: Pool<C>,
        embedder: std::sync::Arc<Embedder>,
        config: CacheConfig,
    ) -> Result<Self, crate::pool::PoolError> {
        {
            let conn = pool.acquire().await?;
            if let Err(e) = conn
                .ensure_collection(&config.collection_name, config.vector_size)
                .await
            {
                warn!(error = %e, "failed to ensure cache collection exists");
            }
        }

        let initial = config.initial_threshold;
        Ok(Self {
            pool,
            embedder,
            config,
            threshold: Mutex::new(ThresholdState {
                current: initial,
                exact_hits: 0,
                semantic_hits: 0,
                misses: 0,
                lookups_since_tune: 0,
            }),
            frequency: Mutex::new(HashMap::new()),
            eviction_index: Mutex::new(HashMap::new()),
        })
    }

    fn current_threshold(&self) -> f32 {
        self.threshold.lock().current
    }

    fn touch_frequency(&self, fp: &str) -> u32 {
        let mut freq = self.frequency.lock();
        let now = now_unix();
        let entry = freq.entry(fp.to_string()).or_insert(FreqMeta {
            count: 0,
            last_seen: now,
        });
        entry.count += 1;
        entry.last_seen = now;
        let count = entry.count;

        let bound = self.config.max_cache_size.saturating_mul(2);
        if freq.len() > bound {
            if let Some(oldest_key) = freq
                .iter()
                .min_by_key(|(_, m)| m.last_seen)
                .map(|(k, _)| k.clone())
            {
                freq.remove(&oldest_key);
            }
        }
        count
    }

    fn observed_frequency(&self, fp: &str) -> u32 {
        self.frequency.lock().get(fp).map(|m| m.count).unwrap_or(0)
    }

    /// Consults the exact tier first, then — if absent and enabled — the
    /// semantic tier. Never returns an error: every failure mode
    /// degrades to [`LookupResult::Miss`] (logged).
    ///
    /// This performs both tiers sequentially within a single logical
    /// lookup, so frequency and hit/miss stats are recorded exactly once
    /// via [`Self::record_lookup`]. Callers that need the two tiers raced
    /// concurrently (spec §4.9) must use [`Self::exact_tier`] /
    /// [`Self::semantic_tier`] directly and record the combined outcome
    /// themselves with [`Self::record_lookup`] — calling this method once
    /// per tier for the same logical query would double-count both.
    pub async fn lookup(&self, text: &str, use_exact: bool, use_semantic: bool) -> LookupResult {
        let mut kind = None;
        let mut hit_entry = None;

        if use_exact {
            if let Some(entry) = self.exact_tier(text).await {
                kind = Some(CacheKind::Exact);
                hit_entry = Some(entry);
            }
        }

        if hit_entry.is_none() && use_semantic {
            if let Some(entry) = self.semantic_tier(text).await {
                kind = Some(CacheKind::Semantic);
                hit_entry = Some(entry);
            }
        }

        self.record_lookup(text, kind);

        match hit_entry {
            Some(entry) => LookupResult::Hit {
                entry,
                kind: kind.expect("kind set alongside hit_entry"),
            },
            None => LookupResult::Miss,
        }
    }

    /// Records frequency and hit/miss stats for exactly one logical
    /// lookup, then runs the adaptive-threshold tuner. `kind` is `Some` if
    /// the lookup was a hit (and which tier served it), `None` on a miss.
    /// Callers orchestrating a concurrent exact/semantic race (as
    /// [`crate::pipeline`] does) must call this exactly once per logical
    /// query, after the race has resolved — never once per tier.
    pub fn record_lookup(&self, text: &str, kind: Option<CacheKind>) {
        let fp = fingerprint(text);
        self.touch_frequency(&fp);
        match kind {
            Some(k) => self.record_hit(k),
            None => self.threshold.lock().misses += 1,
        }
        self.maybe_tune();
    }

    /// Consults the exact tier only. Does not touch frequency or hit/miss
    /// stats — pair with [`Self::record_lookup`] to account for the
    /// logical query this tier lookup is part of.
    pub async fn exact_tier(&self, text: &str) -> Option<CacheEntry> {
        let fp = fingerprint(text);
        self.exact_lookup(&fp).await
    }

    /// Consults the semantic tier only. Does not touch frequency or
    /// hit/miss stats — pair with [`Self::record_lookup`] to account for
    /// the logical query this tier lookup is part of.
    pub async fn semantic_tier(&self, text: &str) -> Option<CacheEntry> {
        self.semantic_lookup(text).await
    }

    async fn exact_lookup(&self, fp: &str) -> Option<CacheEntry> {
        let conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "exact-tier pool acquire failed, treating as miss");
                return None;
            }
        };

        let result = match conn.get_by_fingerprint(&self.config.collection_name, fp).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "exact-tier lookup failed, treating as miss");
                return None;
            }
        }?;

        let entry = search_result_to_entry(result);
        if entry.is_expired(now_unix()) {
            debug!(fingerprint = fp, "exact-tier entry expired, evicting lazily");
            let _ = conn.delete(&self.config.collection_name, fp).await;
            self.eviction_index.lock().remove(fp);
            return None;
        }

        self.bump_access(&*conn, &entry).await;
        Some(entry)
    }

    async fn semantic_lookup(&self, text: &str) -> Option<CacheEntry> {
        let embedding = match self.embedder.embed(text, true).await {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "embedder fault, downgrading semantic lookup to miss");
                return None;
            }
        };

        let conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(error = %e, "semantic-tier pool acquire failed, treating as miss");
                return None;
            }
        };

        let threshold = self.current_threshold();
        let results = match conn
            .search(&self.config.collection_name, embedding, 1, Some(threshold))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "semantic-tier search failed, treating as miss");
                return None;
            }
        };

        let top = results.into_iter().next()?;
        let entry = search_result_to_entry(top);
        if entry.is_expired(now_unix()) {
            let _ = conn.delete(&self.config.collection_name, &entry.fingerprint).await;
            self.eviction_index.lock().remove(&entry.fingerprint);
            return None;
        }

        self.bump_access(&*conn, &entry).await;
        Some(entry)
    }

    async fn bump_access(&self, conn: &impl VectorDbClient, entry: &CacheEntry) {
        let mut bumped = entry.clone();
        bumped.last_accessed = now_unix();
        bumped.access_count += 1;

        self.eviction_index.lock().insert(
            bumped.fingerprint.clone(),
            EvictionMeta {
                access_count: bumped.access_count,
                last_accessed: bumped.last_accessed,
                created_at: bumped.created_at,
            },
        );

        // Embedding isn't carried in CacheEntry once reconstructed from a
        // read, so this write re-embeds; acceptable since it's fire-and-forget
        // bookkeeping, never on the critical path for returning the hit.
        let text = bumped.original_query.clone();
        if let Ok(vector) = self.embedder.embed(&text, true).await {
            let point = entry_to_point(&bumped, vector);
            if let Err(e) = conn
                .upsert_point(
                    &self.config.collection_name,
                    point,
                    crate::vectordb::WriteConsistency::Eventual,
                )
                .await
            {
                debug!(error = %e, "failed to persist access-count bump (non-fatal)");
            }
        }
    }

    fn record_hit(&self, kind: CacheKind) {
        let mut state = self.threshold.lock();
        match kind {
            CacheKind::Exact => state.exact_hits += 1,
            CacheKind::Semantic => state.semantic_hits += 1,
        }
    }

    fn maybe_tune(&self) {
        let mut state = self.threshold.lock();
        state.lookups_since_tune += 1;
        let total = state.exact_hits + state.semantic_hits + state.misses;
        if state.lookups_since_tune < self.config.tuning_window
            || total < self.config.min_lookups_before_tuning
        {
            return;
        }
        state.lookups_since_tune = 0;

        let hit_rate = (state.exact_hits + state.semantic_hits) as f32 / total as f32;
        let target = self.config.target_hit_rate;
        let tolerance = self.config.tolerance;

        if hit_rate < target - tolerance {
            state.current = (state.current - 0.01).max(self.config.min_threshold);
        } else if hit_rate > target + tolerance {
            state.current = (state.current + 0.01).min(self.config.max_threshold);
        }
    }

    /// Stores a fresh response. Declines silently (spec: "may decline")
    /// when the entry isn't judged cache-worthy; logs and swallows any
    /// vector-store write fault rather than failing the caller's request.
    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        text: &str,
        response: &str,
        provider: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) {
        let fp = fingerprint(text);
        let frequency = self.observed_frequency(&fp);

        let cache_worthy = completion_tokens >= self.config.cache_worthy_token_floor
            || frequency >= self.config.frequency_store_floor;
        if !cache_worthy {
            debug!(fingerprint = fp, "declining to cache: not cache-worthy");
            return;
        }

        let embedding = match self.embedder.embed(text, true).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "embedding failed on store, skipping (logged, not fatal)");
                return;
            }
        };

        let ttl = ttl_for_frequency(frequency, &self.config);
        let created_at = now_unix();

        let entry = CacheEntry {
            fingerprint: fp.clone(),
            original_query: text.to_string(),
            response: response.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            prompt_tokens,
            completion_tokens,
            created_at,
            last_accessed: created_at,
            access_count: 1,
            ttl,
        };

        let conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "pool exhausted on store, skipping (logged, not fatal)");
                return;
            }
        };

        let point = entry_to_point(&entry, embedding);
        if let Err(e) = conn
            .upsert_point(
                &self.config.collection_name,
                point,
                crate::vectordb::WriteConsistency::Eventual,
            )
            .await
        {
            warn!(error = %e, "vector-store write failed on store, swallowed");
            return;
        }

        self.eviction_index.lock().insert(
            fp,
            EvictionMeta {
                access_count: 1,
                last_accessed: created_at,
                created_at,
            },
        );

        self.maybe_evict(&*conn).await;
    }

    async fn maybe_evict(&self, conn: &impl VectorDbClient) {
        let over_budget = self.eviction_index.lock().len() > self.config.max_cache_size;
        if !over_budget {
            return;
        }

        let victims: Vec<String> = {
            let index = self.eviction_index.lock();
            let now = now_unix();
            let mut scored: Vec<(String, f32, i64)> = index
                .iter()
                .map(|(fp, meta)| {
                    let hours_since_access =
                        ((now - meta.last_accessed).max(0) as f32) / 3_600.0;
                    let score = meta.access_count as f32 / (1.0 + hours_since_access);
                    (fp.clone(), score, meta.created_at)
                })
                .collect();
            scored.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.2.cmp(&b.2))
            });
            scored
                .into_iter()
                .take(self.config.eviction_batch_size)
                .map(|(fp, _, _)| fp)
                .collect()
        };

        for fp in victims {
            if let Err(e) = conn.delete(&self.config.collection_name, &fp).await {
                debug!(error = %e, fingerprint = fp, "eviction delete failed");
                continue;
            }
            self.eviction_index.lock().remove(&fp);
        }
    }

    /// Deletes a single entry by fingerprint.
    pub async fn invalidate(&self, fingerprint: &str) {
        if let Ok(conn) = self.pool.acquire().await {
            if let Err(e) = conn.delete(&self.config.collection_name, fingerprint).await {
                warn!(error = %e, "invalidate failed");
            }
        }
        self.eviction_index.lock().remove(fingerprint);
    }

    /// Clears every entry this process has seen. Best-effort: it walks the
    /// local eviction index rather than scanning the remote collection, so
    /// entries stored by another process instance are not reached.
    pub async fn clear(&self) {
        let fingerprints: Vec<String> = self.eviction_index.lock().keys().cloned().collect();
        if let Ok(conn) = self.pool.acquire().await {
            for fp in &fingerprints {
                let _ = conn.delete(&self.config.collection_name, fp).await;
            }
        }
        self.eviction_index.lock().clear();
        self.frequency.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.threshold.lock();
        CacheStats {
            lookups: state.exact_hits + state.semantic_hits + state.misses,
            exact_hits: state.exact_hits,
            semantic_hits: state.semantic_hits,
            misses: state.misses,
            current_threshold: state.current,
            tracked_population: self.eviction_index.lock().len(),
        }
    }
}

fn ttl_for_frequency(frequency: u32, config: &CacheConfig) -> Duration {
    match frequency {
        0..=1 => config.ttl_min,
        2..=4 => config.ttl_base,
        5..=9 => config.ttl_base * 2,
        _ => config.ttl_max,
    }
}

fn search_result_to_entry(r: crate::vectordb::SearchResult) -> CacheEntry {
    CacheEntry {
        fingerprint: r.fingerprint,
        original_query: r.original_query,
        response: r.response,
        provider: r.provider,
        model: r.model,
        prompt_tokens: r.prompt_tokens,
        completion_tokens: r.completion_tokens,
        created_at: r.created_at,
        last_accessed: r.last_accessed,
        access_count: r.access_count,
        ttl: Duration::from_secs(r.ttl_secs),
    }
}

fn entry_to_point(entry: &CacheEntry, vector: Vec<f32>) -> VectorPoint {
    VectorPoint::new(
        entry.fingerprint.clone(),
        vector,
        entry.original_query.clone(),
        entry.response.clone(),
        entry.provider.clone(),
        entry.model.clone(),
        entry.prompt_tokens,
        entry.completion_tokens,
        entry.created_at,
        entry.ttl.as_secs(),
    )
}
