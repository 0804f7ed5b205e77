use std::collections::HashSet;

use regex::Regex;

use super::signature::body_similarity;
use crate::executor::ResponseSummary;
use crate::utils::StatusRanges;

const SIMILARITY_THRESHOLD: f64 = 0.9;

/// The include/exclude side of classification. Checks answer with a short
/// drop reason; `None` means the response survives that stage.
#[derive(Debug, Default)]
pub struct FilterChain {
    pub include_status: StatusRanges,
    pub exclude_status: StatusRanges,
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
    pub exclude_sizes: HashSet<usize>,
    pub exclude_text: Vec<String>,
    pub exclude_regex: Option<Regex>,
    pub exclude_redirect: Option<Regex>,
    pub similarity_ref: Option<ResponseSummary>,
}

impl FilterChain {
    pub fn status_reason(&self, status: u16) -> Option<&'static str> {
        if !self.include_status.is_empty() && !self.include_status.contains(status) {
            return Some("status-excluded");
        }
        if self.exclude_status.contains(status) {
            return Some("status-excluded");
        }
        None
    }

    pub fn size_reason(&self, size: usize) -> Option<&'static str> {
        if let Some(min) = self.min_size {
            if size < min {
                return Some("size-excluded");
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return Some("size-excluded");
            }
        }
        if self.exclude_sizes.contains(&size) {
            return Some("size-excluded");
        }
        None
    }

    /// Text, regex, and redirect filters, applied in that order.
    pub fn content_reason(&self, body: &str, redirect: Option<&str>) -> Option<&'static str> {
        for needle in self.exclude_text.iter() {
            if body.contains(needle.as_str()) {
                return Some("text-excluded");
            }
        }
        if let Some(re) = self.exclude_regex.as_ref() {
            if re.is_match(body) {
                return Some("regex-excluded");
            }
        }
        if let Some(re) = self.exclude_redirect.as_ref() {
            if let Some(target) = redirect {
                if re.is_match(target) {
                    return Some("redirect-excluded");
                }
            }
        }
        None
    }

    pub fn similarity_reason(&self, status: u16, body: &str) -> Option<&'static str> {
        let reference = self.similarity_ref.as_ref()?;
        if reference.status != status {
            return None;
        }
        if body_similarity(&reference.body_text(), body) >= SIMILARITY_THRESHOLD {
            return Some("similar-to-reference");
        }
        None
    }
}
