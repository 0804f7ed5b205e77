//! Stable response fingerprints: normalization strips the parts of a body
//! that vary per request (counters, tokens, timestamps rendered as digits
//! or hex) so that two renderings of the same page hash identically.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

static HEX_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9a-fA-F]{8,}").expect("hex run regex"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit run regex"));

const SIGNATURE_BODY_PREFIX: usize = 512;
const SHINGLE_WIDTH: usize = 4;

/// Collapses hex runs first (a hex token is also a digit run), then plain
/// digit runs.
pub fn normalize_body(body: &str) -> String {
    let collapsed = HEX_RUN.replace_all(body, "h");
    DIGIT_RUN.replace_all(&collapsed, "0").into_owned()
}

/// Body sizes rounded to the nearest 32 bytes.
pub fn size_bucket(size: usize) -> usize {
    (size + 16) / 32 * 32
}

pub fn body_fingerprint(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_body(body).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Duplicate-suppression signature over status, size bucket, and the first
/// 512 bytes of the normalized body.
pub fn response_signature(status: u16, body_size: usize, body: &str) -> String {
    let normalized = normalize_body(body);
    let prefix: String = normalized.chars().take(SIGNATURE_BODY_PREFIX).collect();
    let mut hasher = Sha256::new();
    hasher.update(status.to_be_bytes());
    hasher.update((size_bucket(body_size) as u64).to_be_bytes());
    hasher.update(prefix.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn shingles(text: &str) -> HashSet<&[u8]> {
    let bytes = text.as_bytes();
    if bytes.len() < SHINGLE_WIDTH {
        let mut out = HashSet::new();
        if !bytes.is_empty() {
            out.insert(bytes);
        }
        return out;
    }
    bytes.windows(SHINGLE_WIDTH).collect()
}

/// Jaccard index over 4-byte shingles of the normalized bodies.
pub fn body_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_body(a);
    let b = normalize_body(b);
    let sa = shingles(&a);
    let sb = shingles(&b);
    if sa.is_empty() && sb.is_empty() {
        return 1.0;
    }
    if sa.is_empty() || sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.len() + sb.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_volatile_tokens() {
        let a = normalize_body("session id 4815 token deadbeefcafe1234");
        let b = normalize_body("session id 91 token 0123456789abcdef");
        assert_eq!(a, b);
    }

    #[test]
    fn size_bucket_rounds_to_nearest_32() {
        assert_eq!(size_bucket(0), 0);
        assert_eq!(size_bucket(15), 0);
        assert_eq!(size_bucket(16), 32);
        assert_eq!(size_bucket(100), 96);
        assert_eq!(size_bucket(112), 128);
    }

    #[test]
    fn signature_is_stable_across_volatile_bodies() {
        let a = response_signature(200, 1000, "request id 12345 rendered");
        let b = response_signature(200, 990, "request id 987 rendered");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_separates_statuses_and_sizes() {
        let base = response_signature(200, 1000, "same body");
        assert_ne!(base, response_signature(404, 1000, "same body"));
        assert_ne!(base, response_signature(200, 4000, "same body"));
    }

    #[test]
    fn similarity_is_high_for_near_identical_bodies() {
        let a = "<html><body><h1>Page not found</h1><p>try again</p></body></html>";
        let b = "<html><body><h1>Page not found</h1><p>try later</p></body></html>";
        assert!(body_similarity(a, b) > 0.8);
        assert!(body_similarity(a, "completely unrelated content") < 0.3);
    }

    #[test]
    fn similarity_of_identical_bodies_is_one() {
        let body = "static page";
        assert!((body_similarity(body, body) - 1.0).abs() < f64::EPSILON);
    }
}
