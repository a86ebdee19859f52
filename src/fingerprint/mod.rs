//! Query normalization and fingerprinting.
//!
//! The fingerprint is the exact-tier cache key and doubles as the vector-store
//! point id, so two queries that a human would call "the same question" must
//! normalize to the same fingerprint.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Lowercases, applies Unicode NFKC, and collapses interior whitespace runs to
/// a single space, trimming the ends.
///
/// Idempotent: `normalize(normalize(q)) == normalize(q)`.
pub fn normalize(query: &str) -> String {
    let lowered = query.nfkc().collect::<String>().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_space = false;
    for ch in lowered.chars() {
        if ch.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// SHA-256 of the normalized query, hex-encoded. Used as the exact-tier cache
/// key and as the vector-store point id for a stored entry.
///
/// A collision here degrades to a cache-content mismatch, detected and
/// treated as a miss by the caller; it is never trusted as a proof of
/// identity on its own.
pub fn fingerprint(query: &str) -> String {
    let normalized = normalize(query);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let q = "  What   IS the Capital of France?  ";
        let once = normalize(q);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize("What is the capital of France?"),
            normalize(" what is the   CAPITAL of france?  ")
        );
    }

    #[test]
    fn fingerprint_stable_across_extra_whitespace() {
        let a = fingerprint("What is the capital of France?");
        let b = fingerprint("what   is the capital of france?   ");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_is_hex_sha256_length() {
        let fp = fingerprint("hello");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_distinguishes_different_queries() {
        let a = fingerprint("What is the capital of France?");
        let b = fingerprint("What is the capital of Germany?");
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_nfkc_equivalence() {
        // Fullwidth question mark composes under NFKC with the ASCII one.
        let a = fingerprint("hello\u{ff1f}");
        let b = fingerprint("hello?");
        assert_eq!(a, b);
    }
}
