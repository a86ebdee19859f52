//! In-memory `VectorDbClient` fake used by the `mock` feature and by tests.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::client::{CollectionInfo, VectorDbClient};
use super::error::VectorDbError;
use super::model::{SearchResult, VectorPoint, fingerprint_to_point_id, validate_embedding};
use crate::vectordb::WriteConsistency;

struct Stored {
    vector: Vec<f32>,
    fingerprint: String,
    original_query: String,
    response: String,
    provider: String,
    model: String,
    prompt_tokens: u32,
    completion_tokens: u32,
    created_at: i64,
    last_accessed: i64,
    access_count: u32,
    ttl_secs: u64,
}

/// An in-memory stand-in for [`super::QdrantClient`] with brute-force
/// cosine search. Deterministic and synchronous under the hood; useful for
/// tests and for the `mock` feature's offline demos.
#[derive(Default)]
pub struct MockVectorDbClient {
    vector_size: RwLock<HashMap<String, u64>>,
    points: RwLock<HashMap<u64, Stored>>,
    pinged: std::sync::atomic::AtomicBool,
}

impl MockVectorDbClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine similarity between two equal-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

impl VectorDbClient for MockVectorDbClient {
    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        self.vector_size
            .write()
            .insert(name.to_string(), vector_size);
        Ok(())
    }

    async fn upsert_point(
        &self,
        collection: &str,
        point: VectorPoint,
        _consistency: WriteConsistency,
    ) -> Result<(), VectorDbError> {
        if let Some(&dim) = self.vector_size.read().get(collection) {
            validate_embedding(&point.vector, dim as usize)?;
        }
        self.points.write().insert(
            point.id,
            Stored {
                vector: point.vector,
                fingerprint: point.fingerprint,
                original_query: point.original_query,
                response: point.response,
                provider: point.provider,
                model: point.model,
                prompt_tokens: point.prompt_tokens,
                completion_tokens: point.completion_tokens,
                created_at: point.created_at,
                last_accessed: point.last_accessed,
                access_count: point.access_count,
                ttl_secs: point.ttl_secs,
            },
        );
        Ok(())
    }

    async fn get_by_fingerprint(
        &self,
        _collection: &str,
        fingerprint: &str,
    ) -> Result<Option<SearchResult>, VectorDbError> {
        let id = fingerprint_to_point_id(fingerprint);
        let points = self.points.read();
        Ok(points
            .get(&id)
            .filter(|s| s.fingerprint == fingerprint)
            .map(|s| to_search_result(id, 1.0, s)))
    }

    async fn search(
        &self,
        _collection: &str,
        query: Vec<f32>,
        k: u64,
        score_threshold: Option<f32>,
    ) -> Result<Vec<SearchResult>, VectorDbError> {
        let points = self.points.read();
        let mut scored: Vec<SearchResult> = points
            .iter()
            .map(|(&id, s)| to_search_result(id, cosine_similarity(&query, &s.vector), s))
            .filter(|r| score_threshold.is_none_or(|t| r.score >= t))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k as usize);
        Ok(scored)
    }

    async fn delete(&self, _collection: &str, fingerprint: &str) -> Result<(), VectorDbError> {
        let id = fingerprint_to_point_id(fingerprint);
        self.points.write().remove(&id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), VectorDbError> {
        self.pinged
            .store(true, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }

    async fn info(&self, collection: &str) -> Result<CollectionInfo, VectorDbError> {
        Ok(CollectionInfo {
            vector_count: self.points.read().len() as u64,
            status: "green".to_string(),
            vector_size: *self.vector_size.read().get(collection).unwrap_or(&0),
        })
    }
}

fn to_search_result(id: u64, score: f32, s: &Stored) -> SearchResult {
    SearchResult {
        id,
        score,
        fingerprint: s.fingerprint.clone(),
        original_query: s.original_query.clone(),
        response: s.response.clone(),
        provider: s.provider.clone(),
        model: s.model.clone(),
        prompt_tokens: s.prompt_tokens,
        completion_tokens: s.completion_tokens,
        created_at: s.created_at,
        last_accessed: s.last_accessed,
        access_count: s.access_count,
        ttl_secs: s.ttl_secs,
    }
}
