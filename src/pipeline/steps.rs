//! The default Normalize and Validate stages. Cache-lookup and
//! dispatch-and-store are wired directly into [`super::QueryPipeline::run`]
//! since they need shared access to the cache, dispatcher, and cost
//! tracker that only the pipeline owns; these two are pure functions of the
//! query alone.

use crate::error::{ErrorKind, PipelineError};
use crate::fingerprint::normalize as normalize_text;

use super::Query;

const MIN_QUERY_LEN: usize = 1;
const MAX_QUERY_LEN: usize = 10_000;
const MAX_MAX_TOKENS: u32 = 4_000;
const MIN_MAX_TOKENS: u32 = 1;
const MAX_TEMPERATURE: f32 = 2.0;

/// Normalizes the query text per [`crate::fingerprint::normalize`].
pub fn normalize(query: &Query) -> Result<String, PipelineError> {
    Ok(normalize_text(&query.text))
}

/// Validates the query shape against spec §6's bounds, operating on the
/// already-normalized text so whitespace padding doesn't count against the
/// length bound.
pub fn validate(query: &Query, normalized: &str) -> Result<(), PipelineError> {
    let len = normalized.chars().count();
    if len < MIN_QUERY_LEN || len > MAX_QUERY_LEN {
        return Err(PipelineError::new(
            ErrorKind::ValidationFault,
            format!("query length {len} outside [{MIN_QUERY_LEN}, {MAX_QUERY_LEN}]"),
        ));
    }

    if let Some(max_tokens) = query.max_tokens {
        if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
            return Err(PipelineError::new(
                ErrorKind::ValidationFault,
                format!("max_tokens {max_tokens} outside [{MIN_MAX_TOKENS}, {MAX_MAX_TOKENS}]"),
            ));
        }
    }

    if let Some(temperature) = query.temperature {
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(PipelineError::new(
                ErrorKind::ValidationFault,
                format!("temperature {temperature} outside [0, {MAX_TEMPERATURE}]"),
            ));
        }
    }

    Ok(())
}
