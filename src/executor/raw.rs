//! Replay of a captured raw HTTP request with the candidate path injected
//! at a `*` marker in the request target.

use std::str::FromStr;
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::FutureExt;
use tokio::time::Instant;

use super::{
    build_client, header_map_to_hashmap, RequestExecutor, RequestSpec, ResponseSummary,
    TransportError,
};

#[derive(Clone, Debug)]
pub struct RawRequestTemplate {
    method: reqwest::Method,
    target: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl RawRequestTemplate {
    /// Parses a Burp-style raw request. The request target must carry a
    /// single `*` marker where candidate paths get injected.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.replace("\r\n", "\n");
        let raw = raw.trim_matches('\u{feff}');
        let (head, body) = raw.split_once("\n\n").unwrap_or((raw, ""));
        let mut lines = head.lines();
        let request_line = lines.next().ok_or_else(|| "raw request is empty".to_string())?;
        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| "missing method in request line".to_string())?;
        let target = parts
            .next()
            .ok_or_else(|| "missing target in request line".to_string())?;

        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| "invalid method in request line".to_string())?;

        if target.matches('*').count() != 1 {
            return Err("raw request target must carry exactly one '*' marker".to_string());
        }

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let (k, v) = line
                .split_once(':')
                .ok_or_else(|| "invalid header line in raw request".to_string())?;
            headers.push((k.trim().to_string(), v.trim_start().to_string()));
        }

        Ok(Self {
            method,
            target: target.to_string(),
            headers,
            body: body.to_string(),
        })
    }

    /// Infers the scan target URL from the request line and Host header,
    /// with the marker removed.
    pub fn base_url(&self) -> Result<String, String> {
        let sanitized = self.target.replace('*', "");
        if sanitized.starts_with("http://") || sanitized.starts_with("https://") {
            let url = reqwest::Url::parse(&sanitized)
                .map_err(|_| "invalid request target url".to_string())?;
            return Ok(url.to_string());
        }

        let host = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("host"))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| "missing Host header in raw request".to_string())?;

        let base = format!("https://{host}/");
        let base = reqwest::Url::parse(&base).map_err(|_| "invalid Host header".to_string())?;
        let path = if sanitized.starts_with('/') {
            sanitized
        } else {
            format!("/{sanitized}")
        };
        base.join(&path)
            .map(|u| u.to_string())
            .map_err(|_| "invalid request target path".to_string())
    }

    fn render(&self, path: &str) -> Result<reqwest::Url, String> {
        let target = self.target.replacen('*', path, 1);
        if target.starts_with("http://") || target.starts_with("https://") {
            return reqwest::Url::parse(&target).map_err(|_| "invalid rendered url".to_string());
        }
        let base = self.base_url()?;
        let base = reqwest::Url::parse(&base).map_err(|_| "invalid base url".to_string())?;
        let target = if target.starts_with('/') {
            target
        } else {
            format!("/{target}")
        };
        base.join(&target).map_err(|_| "invalid rendered path".to_string())
    }
}

/// Executor that replays the captured request once per candidate.
pub struct RawTemplateExecutor {
    client: reqwest::Client,
    template: RawRequestTemplate,
}

impl RawTemplateExecutor {
    pub fn new(
        template: RawRequestTemplate,
        proxy: Option<&str>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, TransportError> {
        let client = build_client(proxy, timeout, user_agent)?;
        Ok(Self { client, template })
    }

    async fn execute_inner(&self, spec: &RequestSpec) -> Result<ResponseSummary, TransportError> {
        let url = self
            .template
            .render(&spec.path)
            .map_err(TransportError::InvalidRequest)?;

        let mut builder = self
            .client
            .request(self.template.method.clone(), url.clone())
            .timeout(spec.timeout);
        for (k, v) in self.template.headers.iter() {
            if k.eq_ignore_ascii_case("host") || k.eq_ignore_ascii_case("content-length") {
                continue;
            }
            let key = reqwest::header::HeaderName::from_str(k.trim())
                .map_err(|_| TransportError::InvalidRequest(format!("bad header name '{k}'")))?;
            let value = reqwest::header::HeaderValue::from_str(v.trim())
                .map_err(|_| TransportError::InvalidRequest(format!("bad header value for '{k}'")))?;
            builder = builder.header(key, value);
        }
        for (k, v) in spec.headers.iter() {
            builder = builder.header(k.as_str(), v.as_str());
        }
        if !self.template.body.is_empty() {
            builder = builder.body(self.template.body.clone());
        }

        let started = Instant::now();
        let resp = builder
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;
        let status = resp.status().as_u16();
        let headers = header_map_to_hashmap(resp.headers());
        let redirect_chain = headers
            .get("location")
            .map(|loc| vec![loc.clone()])
            .unwrap_or_default();
        let body = match resp.bytes().await {
            Ok(body) => body.to_vec(),
            Err(_) => Vec::new(),
        };
        Ok(ResponseSummary {
            status,
            body_size: body.len(),
            body,
            headers,
            final_url: url.to_string(),
            redirect_chain,
            elapsed_ms: started.elapsed().as_millis() as u64,
            retry_count: 0,
        })
    }
}

impl RequestExecutor for RawTemplateExecutor {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
        async move { self.execute_inner(spec).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "GET /app/* HTTP/1.1\nHost: example.com\nX-Api-Key: abc123\n\n";

    #[test]
    fn parse_extracts_method_target_and_headers() {
        let t = RawRequestTemplate::parse(RAW).unwrap();
        assert_eq!(t.method, reqwest::Method::GET);
        assert_eq!(t.target, "/app/*");
        assert!(t
            .headers
            .iter()
            .any(|(k, v)| k == "X-Api-Key" && v == "abc123"));
    }

    #[test]
    fn parse_requires_single_marker() {
        assert!(RawRequestTemplate::parse("GET /app/ HTTP/1.1\nHost: h\n\n").is_err());
        assert!(RawRequestTemplate::parse("GET /a/*/b/* HTTP/1.1\nHost: h\n\n").is_err());
    }

    #[test]
    fn base_url_comes_from_host_header() {
        let t = RawRequestTemplate::parse(RAW).unwrap();
        assert_eq!(t.base_url().unwrap(), "https://example.com/app/");
    }

    #[test]
    fn render_injects_candidate_path() {
        let t = RawRequestTemplate::parse(RAW).unwrap();
        let url = t.render("admin/login.php").unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/admin/login.php");
    }
}
