//! Per-target wildcard learning. Before real probing starts, a handful of
//! requests for paths that cannot exist teach us what this origin returns
//! for garbage, so soft 404s and catch-all redirects can be suppressed.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use thiserror::Error;

use crate::classify::signature::{body_fingerprint, size_bucket};
use crate::executor::{RequestExecutor, RequestSpec, ResponseSummary};
use crate::limiter::RateGate;

pub const PROBE_COUNT: usize = 4;
const TOKEN_LEN: usize = 16;
const MIN_AGREEMENT: usize = 2;

/// What the origin looks like when asked for nonsense. Built once per
/// target and never modified afterwards.
#[derive(Debug, Default)]
pub struct CalibrationData {
    status_set: HashSet<u16>,
    status_size_buckets: HashSet<(u16, usize)>,
    body_hashes: HashSet<String>,
    redirect_pattern: Option<Regex>,
}

impl CalibrationData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.status_size_buckets.is_empty()
            && self.body_hashes.is_empty()
            && self.redirect_pattern.is_none()
    }

    pub fn statuses(&self) -> &HashSet<u16> {
        &self.status_set
    }

    /// A response is a wildcard hit when its (status, size bucket) pair was
    /// trusted, its normalized body hash was trusted, or its redirect
    /// target matches the recorded pattern.
    pub fn matches(&self, summary: &ResponseSummary) -> bool {
        if self
            .status_size_buckets
            .contains(&(summary.status, size_bucket(summary.body_size)))
        {
            return true;
        }
        if !self.body_hashes.is_empty()
            && self.body_hashes.contains(&body_fingerprint(&summary.body_text()))
        {
            return true;
        }
        if let Some(re) = self.redirect_pattern.as_ref() {
            let target = summary
                .redirect_chain
                .last()
                .map(String::as_str)
                .or_else(|| summary.location());
            if let Some(target) = target {
                if re.is_match(target) {
                    return true;
                }
            }
        }
        false
    }
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("all calibration probes failed against {target}")]
    AllProbesFailed { target: String },
}

pub fn random_token(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Folds probe responses into trusted buckets. A bucket counts as trusted
/// when at least two probes agreed on it.
pub fn build_calibration(samples: &[(String, ResponseSummary)]) -> CalibrationData {
    let mut status_set: HashSet<u16> = HashSet::new();
    let mut bucket_counts: HashMap<(u16, usize), usize> = HashMap::new();
    let mut hash_counts: HashMap<String, usize> = HashMap::new();
    let mut redirect_counts: HashMap<String, usize> = HashMap::new();

    for (token, summary) in samples {
        status_set.insert(summary.status);
        *bucket_counts
            .entry((summary.status, size_bucket(summary.body_size)))
            .or_insert(0) += 1;
        *hash_counts
            .entry(body_fingerprint(&summary.body_text()))
            .or_insert(0) += 1;

        if (300..400).contains(&summary.status) {
            let target = summary
                .redirect_chain
                .last()
                .map(String::as_str)
                .or_else(|| summary.location());
            if let Some(target) = target {
                // the probe token is the only random part; templating it
                // out lets distinct probes agree
                *redirect_counts
                    .entry(target.replace(token.as_str(), "\u{0}"))
                    .or_insert(0) += 1;
            }
        }
    }

    let status_size_buckets = bucket_counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_AGREEMENT)
        .map(|(bucket, _)| bucket)
        .collect();
    let body_hashes = hash_counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_AGREEMENT)
        .map(|(hash, _)| hash)
        .collect();
    let redirect_pattern = redirect_counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_AGREEMENT)
        .map(|(template, _)| template)
        .next()
        .and_then(|template| compile_redirect_pattern(&template));

    CalibrationData {
        status_set,
        status_size_buckets,
        body_hashes,
        redirect_pattern,
    }
}

fn compile_redirect_pattern(template: &str) -> Option<Regex> {
    let escaped: Vec<String> = template.split('\u{0}').map(|part| regex::escape(part)).collect();
    Regex::new(&format!("^{}$", escaped.join(".*"))).ok()
}

/// Issues the probe round and folds the survivors. `prefix` scopes the
/// probes under a discovered directory (root calibration passes "").
/// Fails only when every probe died at the transport layer.
pub async fn calibrate(
    executor: &dyn RequestExecutor,
    gate: &RateGate,
    base_url: &str,
    prefix: &str,
    sample_extension: Option<&str>,
    headers: &[(String, String)],
    timeout: Duration,
) -> Result<CalibrationData, CalibrationError> {
    let ext = sample_extension.unwrap_or("html");
    let mut probes: Vec<(String, String)> = Vec::with_capacity(PROBE_COUNT);
    for i in 0..PROBE_COUNT {
        let token = random_token(TOKEN_LEN);
        let path = if i % 2 == 0 {
            format!("{prefix}{token}")
        } else {
            format!("{prefix}{token}.{ext}")
        };
        probes.push((token, path));
    }

    let mut samples: Vec<(String, ResponseSummary)> = Vec::with_capacity(PROBE_COUNT);
    for (token, path) in probes {
        gate.acquire().await;
        let spec = RequestSpec {
            method: reqwest::Method::GET,
            url: crate::utils::join_url(base_url, &path),
            path,
            headers: headers.to_vec(),
            body: None,
            follow_redirects: false,
            timeout,
        };
        if let Ok(summary) = executor.execute(&spec).await {
            samples.push((token, summary));
        }
    }

    if samples.is_empty() {
        return Err(CalibrationError::AllProbesFailed {
            target: crate::utils::join_url(base_url, prefix),
        });
    }

    Ok(build_calibration(&samples))
}
