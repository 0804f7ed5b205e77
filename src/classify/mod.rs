//! Response classification: the filter chain decides whether a response is
//! worth reporting, the type tagger decides what produced it.

pub mod filters;
pub mod signature;
pub mod waf;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::calibrate::CalibrationData;
use crate::executor::ResponseSummary;
use filters::FilterChain;
use signature::response_signature;
use waf::{Layer, SignatureDb};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResponseKind {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "WAF")]
    Waf,
    #[serde(rename = "APP")]
    App,
    #[serde(rename = "SYS")]
    Sys,
    #[serde(rename = "RED")]
    Redirect,
    #[serde(rename = "FILTERED")]
    Filtered,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ResponseKind::Ok => "OK",
            ResponseKind::Waf => "WAF",
            ResponseKind::App => "APP",
            ResponseKind::Sys => "SYS",
            ResponseKind::Redirect => "RED",
            ResponseKind::Filtered => "FILTERED",
        };
        f.write_str(tag)
    }
}

#[derive(Clone, Debug)]
pub struct Classification {
    pub kind: ResponseKind,
    pub source_label: String,
    pub signature: String,
    pub keep: bool,
    pub drop_reason: Option<&'static str>,
}

/// One classifier per target scan. The duplicate counter is the only
/// mutable state; its update-and-check is atomic under the mutex.
/// Calibration data is an argument because recalibration can scope it to
/// the directory pass that produced the response.
pub struct Classifier {
    chain: FilterChain,
    db: Arc<SignatureDb>,
    filter_threshold: u64,
    duplicate_counts: Mutex<HashMap<String, u64>>,
}

impl Classifier {
    pub fn new(chain: FilterChain, db: Arc<SignatureDb>, filter_threshold: u64) -> Self {
        Self {
            chain,
            db,
            filter_threshold,
            duplicate_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn classify(
        &self,
        summary: &ResponseSummary,
        calibration: Option<&CalibrationData>,
    ) -> Classification {
        let body = summary.body_text();
        let sig = response_signature(summary.status, summary.body_size, &body);

        let filtered = |reason: &'static str| Classification {
            kind: ResponseKind::Filtered,
            source_label: String::new(),
            signature: sig.clone(),
            keep: false,
            drop_reason: Some(reason),
        };

        // status 0 is the synthetic marker for exhausted transports
        if summary.status == 0 {
            return filtered("transport");
        }
        if let Some(reason) = self.chain.status_reason(summary.status) {
            return filtered(reason);
        }
        if let Some(reason) = self.chain.size_reason(summary.body_size) {
            return filtered(reason);
        }
        if let Some(calibration) = calibration {
            if calibration.matches(summary) {
                return filtered("wildcard");
            }
        }
        let redirect = summary
            .redirect_chain
            .last()
            .map(String::as_str)
            .or_else(|| summary.location());
        if let Some(reason) = self.chain.content_reason(&body, redirect) {
            return filtered(reason);
        }
        if let Some(reason) = self.chain.similarity_reason(summary.status, &body) {
            return filtered(reason);
        }
        if self.filter_threshold > 0 {
            let mut counts = match self.duplicate_counts.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let count = counts.entry(sig.clone()).or_insert(0);
            if *count >= self.filter_threshold {
                return filtered("threshold");
            }
            *count += 1;
        }

        let (kind, source_label) = self.tag(summary, &body);
        Classification {
            kind,
            source_label,
            signature: sig,
            keep: true,
            drop_reason: None,
        }
    }

    fn tag(&self, summary: &ResponseSummary, body: &str) -> (ResponseKind, String) {
        if (300..400).contains(&summary.status) {
            return (ResponseKind::Redirect, String::new());
        }
        if let Some(sig) = self.db.waf_match(summary, body) {
            let kind = match sig.layer {
                Layer::Infra => ResponseKind::Waf,
                Layer::App => ResponseKind::App,
            };
            return (kind, sig.label.clone());
        }
        if let Some(default) = self.db.server_default_match(summary, body) {
            return (ResponseKind::Sys, default.label.clone());
        }
        if (200..300).contains(&summary.status) {
            return (ResponseKind::Ok, String::new());
        }
        (ResponseKind::App, "Backend".to_string())
    }
}
