//! Point and search-result types for the cache's vector-store collection.
//!
//! A cache entry's vector-store point id is derived from its fingerprint
//! (spec: "fingerprint is also the point id, to make exact-tier lookup a
//! single get-by-id"). Qdrant point ids are `u64` or UUID, not arbitrary
//! strings, so [`fingerprint_to_point_id`] folds the fingerprint's leading
//! 8 bytes into a `u64`; the full fingerprint is carried in the payload so a
//! truncation collision is detected as a payload mismatch rather than
//! trusted blindly.

use serde::{Deserialize, Serialize};

use super::VectorDbError;

/// A cache entry as stored in the vector collection: the embedding plus the
/// payload fields needed to reconstruct a [`crate::cache::CacheEntry`]
/// without a second round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: u64,
    pub vector: Vec<f32>,
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
    pub ttl_secs: u64,
}

impl VectorPoint {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fingerprint: String,
        vector: Vec<f32>,
        original_query: String,
        response: String,
        provider: String,
        model: String,
        prompt_tokens: u32,
        completion_tokens: u32,
        created_at: i64,
        ttl_secs: u64,
    ) -> Self {
        let id = fingerprint_to_point_id(&fingerprint);
        Self {
            id,
            vector,
            fingerprint,
            original_query,
            response,
            provider,
            model,
            prompt_tokens,
            completion_tokens,
            created_at,
            last_accessed: created_at,
            access_count: 1,
            ttl_secs,
        }
    }
}

/// A hit returned from a vector-store search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u64,
    pub score: f32,
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
    pub ttl_secs: u64,
}

/// Folds a hex fingerprint's leading 8 bytes into a `u64` point id.
///
/// Not cryptographic, not collision-free: two fingerprints can map to the
/// same id. Callers must compare the full `fingerprint` payload field
/// before trusting a point as an exact match.
pub fn fingerprint_to_point_id(fingerprint: &str) -> u64 {
    let bytes = hex_prefix_bytes(fingerprint);
    u64::from_be_bytes(bytes)
}

fn hex_prefix_bytes(fingerprint: &str) -> [u8; 8] {
    let mut out = [0u8; 8];
    let hex = fingerprint.as_bytes();
    for (i, chunk) in out.iter_mut().enumerate() {
        let idx = i * 2;
        if idx + 1 < hex.len() {
            let hi = hex_val(hex[idx]);
            let lo = hex_val(hex[idx + 1]);
            *chunk = (hi << 4) | lo;
        }
    }
    out
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Validates an embedding against the collection's declared dimension:
/// length must match and no component may be NaN or infinite.
pub fn validate_embedding(vector: &[f32], expected_dim: usize) -> Result<(), VectorDbError> {
    if vector.len() != expected_dim {
        return Err(VectorDbError::InvalidDimension {
            expected: expected_dim,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(VectorDbError::InvalidDimension {
            expected: expected_dim,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_deterministic() {
        let fp = "abc123def4560000000000000000000000000000000000000000000000000000";
        assert_eq!(fingerprint_to_point_id(fp), fingerprint_to_point_id(fp));
    }

    #[test]
    fn validate_embedding_rejects_wrong_length() {
        assert!(validate_embedding(&[0.0; 3], 4).is_err());
    }

    #[test]
    fn validate_embedding_rejects_nan() {
        assert!(validate_embedding(&[0.0, f32::NAN], 2).is_err());
    }

    #[test]
    fn validate_embedding_accepts_matching_finite_vector() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
    }
}
