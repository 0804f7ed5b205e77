//! Vendor fingerprints are data, not code: an ordered JSON array compiled
//! into regex matchers once at startup. First match wins. A signature
//! matches when every match family it specifies (status, header, body) has
//! at least one hit.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::executor::ResponseSummary;
use crate::utils::StatusRanges;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Infra,
    App,
}

#[derive(Debug, Deserialize)]
pub struct RawSignature {
    pub vendor: String,
    pub layer: Layer,
    pub label: String,
    #[serde(rename = "match")]
    pub matcher: RawMatcher,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawMatcher {
    #[serde(default)]
    pub status: Vec<StatusSpec>,
    #[serde(default)]
    pub header: Vec<RawHeaderRule>,
    #[serde(default)]
    pub body_regex: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StatusSpec {
    Code(u16),
    Range(String),
}

#[derive(Debug, Deserialize)]
pub struct RawHeaderRule {
    pub name: String,
    pub regex: String,
}

#[derive(Debug, Error)]
pub enum SignatureDbError {
    #[error("failed to read signature database: {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse signature database: {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid regex in signature '{vendor}': {source}")]
    Regex {
        vendor: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid status in signature '{vendor}': {message}")]
    Status { vendor: String, message: String },

    #[error("signature '{vendor}' has an empty match block")]
    EmptyMatcher { vendor: String },
}

#[derive(Debug)]
pub struct CompiledSignature {
    pub vendor: String,
    pub layer: Layer,
    pub label: String,
    status: StatusRanges,
    headers: Vec<(String, Regex)>,
    body: Vec<Regex>,
}

impl CompiledSignature {
    fn matches(&self, summary: &ResponseSummary, body: &str) -> bool {
        if !self.status.is_empty() && !self.status.contains(summary.status) {
            return false;
        }
        if !self.headers.is_empty()
            && !self.headers.iter().any(|(name, re)| {
                summary
                    .header(name)
                    .map(|value| re.is_match(value))
                    .unwrap_or(false)
            })
        {
            return false;
        }
        if !self.body.is_empty() && !self.body.iter().any(|re| re.is_match(body)) {
            return false;
        }
        true
    }
}

/// Built-in fingerprints for stock web-server error pages. These require
/// the characteristic page body; a bare Server header is not evidence that
/// the response came from the server's own error handler.
#[derive(Debug)]
pub struct ServerDefault {
    pub label: String,
    status: StatusRanges,
    server: Option<Regex>,
    body: Option<Regex>,
}

impl ServerDefault {
    fn matches(&self, summary: &ResponseSummary, body: &str) -> bool {
        if !self.status.contains(summary.status) {
            return false;
        }
        if let Some(re) = self.server.as_ref() {
            let hit = summary
                .header("server")
                .map(|value| re.is_match(value))
                .unwrap_or(false);
            if !hit {
                return false;
            }
        }
        if let Some(re) = self.body.as_ref() {
            if !re.is_match(body) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
pub struct SignatureDb {
    signatures: Vec<CompiledSignature>,
    server_defaults: Vec<ServerDefault>,
}

impl SignatureDb {
    pub fn load(path: &Path) -> Result<Self, SignatureDbError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| SignatureDbError::Read {
            path: display.clone(),
            source,
        })?;
        let raw: Vec<RawSignature> =
            serde_json::from_str(&contents).map_err(|source| SignatureDbError::Parse {
                path: display,
                source,
            })?;
        Self::compile(raw)
    }

    pub fn compile(raw: Vec<RawSignature>) -> Result<Self, SignatureDbError> {
        let mut signatures = Vec::with_capacity(raw.len());
        for sig in raw {
            if sig.matcher.status.is_empty()
                && sig.matcher.header.is_empty()
                && sig.matcher.body_regex.is_empty()
            {
                return Err(SignatureDbError::EmptyMatcher { vendor: sig.vendor });
            }

            let mut ranges: Vec<(u16, u16)> = Vec::new();
            for spec in sig.matcher.status {
                match spec {
                    StatusSpec::Code(code) => ranges.push((code, code)),
                    StatusSpec::Range(text) => match parse_range_bounds(&text) {
                        Some(bounds) => ranges.push(bounds),
                        None => {
                            return Err(SignatureDbError::Status {
                                vendor: sig.vendor,
                                message: format!("'{text}'"),
                            })
                        }
                    },
                }
            }

            let mut headers = Vec::with_capacity(sig.matcher.header.len());
            for rule in sig.matcher.header {
                let re = Regex::new(&rule.regex).map_err(|source| SignatureDbError::Regex {
                    vendor: sig.vendor.clone(),
                    source,
                })?;
                headers.push((rule.name.to_lowercase(), re));
            }

            let mut body = Vec::with_capacity(sig.matcher.body_regex.len());
            for pattern in sig.matcher.body_regex {
                let re = Regex::new(&pattern).map_err(|source| SignatureDbError::Regex {
                    vendor: sig.vendor.clone(),
                    source,
                })?;
                body.push(re);
            }

            signatures.push(CompiledSignature {
                vendor: sig.vendor,
                layer: sig.layer,
                label: sig.label,
                status: StatusRanges::from_ranges(ranges),
                headers,
                body,
            });
        }

        Ok(Self {
            signatures,
            server_defaults: builtin_server_defaults(),
        })
    }

    /// The compiled-in vendor list, used when no database file is present
    /// or the file fails to parse.
    pub fn builtin() -> Self {
        let raw: Vec<RawSignature> =
            serde_json::from_str(BUILTIN_SIGNATURES).expect("builtin signatures parse");
        Self::compile(raw).expect("builtin signatures compile")
    }

    pub fn waf_match(&self, summary: &ResponseSummary, body: &str) -> Option<&CompiledSignature> {
        self.signatures.iter().find(|sig| sig.matches(summary, body))
    }

    pub fn server_default_match(
        &self,
        summary: &ResponseSummary,
        body: &str,
    ) -> Option<&ServerDefault> {
        self.server_defaults
            .iter()
            .find(|def| def.matches(summary, body))
    }
}

fn parse_range_bounds(text: &str) -> Option<(u16, u16)> {
    let text = text.trim();
    if let Some(class) = text.strip_suffix("xx") {
        let class: u16 = class.parse().ok()?;
        if !(1..=5).contains(&class) {
            return None;
        }
        return Some((class * 100, class * 100 + 99));
    }
    if let Some((lo, hi)) = text.split_once('-') {
        let lo: u16 = lo.trim().parse().ok()?;
        let hi: u16 = hi.trim().parse().ok()?;
        return (lo <= hi).then_some((lo, hi));
    }
    text.parse::<u16>().ok().map(|v| (v, v))
}

fn builtin_server_defaults() -> Vec<ServerDefault> {
    let status = StatusRanges::from_ranges(vec![(403, 404), (500, 599)]);
    let compile = |pattern: &str| Regex::new(pattern).expect("server default regex");
    vec![
        ServerDefault {
            label: "Nginx Default".to_string(),
            status: status.clone(),
            server: Some(compile("(?i)nginx")),
            body: Some(compile("(?i)<center>nginx(/[0-9.]+)?</center>")),
        },
        ServerDefault {
            label: "Apache Default".to_string(),
            status: status.clone(),
            server: None,
            body: Some(compile("(?i)<address>Apache[^<]*Server at")),
        },
        ServerDefault {
            label: "IIS Default".to_string(),
            status: status.clone(),
            server: Some(compile("(?i)microsoft-iis")),
            body: Some(compile(
                "(?i)(The resource you are looking for has been removed|Server Error in|HTTP Error 40[34])",
            )),
        },
        ServerDefault {
            label: "Tomcat Default".to_string(),
            status,
            server: None,
            body: Some(compile("(?i)<h3>Apache Tomcat[^<]*</h3>")),
        },
    ]
}

// mirrors db/waf_signatures.json so the scanner keeps working without it
const BUILTIN_SIGNATURES: &str = include_str!("../../db/waf_signatures.json");
