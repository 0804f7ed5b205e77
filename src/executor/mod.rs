pub mod raw;

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use tokio::time::Instant;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:95.0) Gecko/20100101 Firefox/95.0";

const MAX_REDIRECT_HOPS: usize = 10;

/// One concrete HTTP probe, fully described.
///
/// `url` is the absolute request URL; `path` is the candidate path relative
/// to the target root, kept separately so template-based executors can
/// inject it without re-parsing the URL.
#[derive(Clone, Debug)]
pub struct RequestSpec {
    pub method: reqwest::Method,
    pub url: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub follow_redirects: bool,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// Timeouts and connection-level failures are worth another attempt;
    /// a request we could not even build is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::InvalidRequest(_))
    }

    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() || err.is_request() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Everything the classifier needs to know about one response.
#[derive(Clone, Debug)]
pub struct ResponseSummary {
    pub status: u16,
    pub body: Vec<u8>,
    pub body_size: usize,
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub redirect_chain: Vec<String>,
    pub elapsed_ms: u64,
    pub retry_count: u32,
}

impl ResponseSummary {
    /// Placeholder emitted when every transport attempt failed; status 0 is
    /// dropped by the classifier.
    pub fn transport_failure(url: &str) -> Self {
        Self {
            status: 0,
            body: Vec::new(),
            body_size: 0,
            headers: HashMap::new(),
            final_url: url.to_string(),
            redirect_chain: Vec::new(),
            elapsed_ms: 0,
            retry_count: 0,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    pub fn location(&self) -> Option<&str> {
        self.header("location")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Boundary to pluggable HTTP clients. Implementations must be safe for
/// concurrent calls.
pub trait RequestExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>>;
}

pub(crate) fn header_map_to_hashmap(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (k, v) in headers.iter() {
        if let Ok(v) = v.to_str() {
            out.insert(k.as_str().to_lowercase(), v.to_string());
        }
    }
    out
}

/// Plain `reqwest`-backed executor. Redirects are never delegated to the
/// client so the hop chain stays observable.
pub struct HttpExecutor {
    client: reqwest::Client,
}

impl HttpExecutor {
    pub fn new(
        proxy: Option<&str>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, TransportError> {
        let client = build_client(proxy, timeout, user_agent)?;
        Ok(Self { client })
    }

    async fn execute_inner(&self, spec: &RequestSpec) -> Result<ResponseSummary, TransportError> {
        let started = Instant::now();
        let mut current_url = spec.url.clone();
        let mut chain: Vec<String> = Vec::new();

        loop {
            let mut builder = self
                .client
                .request(spec.method.clone(), &current_url)
                .timeout(spec.timeout);
            for (k, v) in spec.headers.iter() {
                builder = builder.header(k.as_str(), v.as_str());
            }
            if let Some(body) = spec.body.as_ref() {
                builder = builder.body(body.clone());
            }

            let resp = builder
                .send()
                .await
                .map_err(TransportError::from_reqwest)?;
            let status = resp.status().as_u16();
            let headers = header_map_to_hashmap(resp.headers());

            if (300..400).contains(&status) {
                if let Some(next) = resolve_location(&current_url, &headers) {
                    chain.push(next.clone());
                    if spec.follow_redirects && chain.len() <= MAX_REDIRECT_HOPS {
                        current_url = next;
                        continue;
                    }
                }
            }

            let body = match resp.bytes().await {
                Ok(body) => body.to_vec(),
                Err(_) => Vec::new(),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(ResponseSummary {
                status,
                body_size: body.len(),
                body,
                headers,
                final_url: current_url,
                redirect_chain: chain,
                elapsed_ms,
                retry_count: 0,
            });
        }
    }
}

impl RequestExecutor for HttpExecutor {
    fn execute<'a>(
        &'a self,
        spec: &'a RequestSpec,
    ) -> BoxFuture<'a, Result<ResponseSummary, TransportError>> {
        async move { self.execute_inner(spec).await }.boxed()
    }
}

fn resolve_location(current: &str, headers: &HashMap<String, String>) -> Option<String> {
    let location = headers.get("location")?;
    let base = reqwest::Url::parse(current).ok()?;
    base.join(location).ok().map(|u| u.to_string())
}

pub(crate) fn build_client(
    proxy: Option<&str>,
    timeout: Duration,
    user_agent: &str,
) -> Result<reqwest::Client, TransportError> {
    let mut headers = reqwest::header::HeaderMap::new();
    let ua = reqwest::header::HeaderValue::from_str(user_agent)
        .unwrap_or_else(|_| reqwest::header::HeaderValue::from_static(DEFAULT_USER_AGENT));
    headers.insert(reqwest::header::USER_AGENT, ua);

    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(timeout)
        .danger_accept_invalid_hostnames(true)
        .danger_accept_invalid_certs(true);

    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| TransportError::InvalidRequest(format!("proxy setup failed: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| TransportError::Other(format!("client build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failure_is_status_zero() {
        let summary = ResponseSummary::transport_failure("http://t/x");
        assert_eq!(summary.status, 0);
        assert_eq!(summary.body_size, 0);
    }

    #[test]
    fn invalid_request_is_not_retryable() {
        assert!(!TransportError::InvalidRequest("bad".into()).is_retryable());
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::Connect("refused".into()).is_retryable());
    }

    #[test]
    fn location_resolves_relative_to_current_url() {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), "/login/".to_string());
        let next = resolve_location("http://example.com/admin", &headers).unwrap();
        assert_eq!(next, "http://example.com/login/");
    }
}
