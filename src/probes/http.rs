//! HTTP probe: one request against an [`Endpoint`], classified into a
//! tri-state [`Verdict`].

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::debug;

use super::{Probe, ProbeError, Verdict};

/// Message recorded when an optional endpoint answers 404.
pub const OPTIONAL_404_MESSAGE: &str = "endpoint not available (optional)";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base URLs must name an `http://` or `https://` scheme.
pub fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Request payload attached to an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(Value),
    Raw { content_type: String, body: String },
}

/// One probe target. Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Endpoint {
    base_url: String,
    path: String,
    method: Method,
    timeout: Duration,
    expected_status: BTreeSet<u16>,
    optional_on_404: bool,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
}

impl Endpoint {
    /// # Panics
    ///
    /// Panics if `base_url` is not an `http://` or `https://` URL.
    pub fn new(method: Method, base_url: &str, path: &str) -> Self {
        assert!(is_http_url(base_url), "endpoint base URL must be http(s): {base_url:?}");
        let path = if path.is_empty() || path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            path,
            method,
            timeout: DEFAULT_TIMEOUT,
            expected_status: BTreeSet::from([200]),
            optional_on_404: false,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(base_url: &str, path: &str) -> Self {
        Self::new(Method::GET, base_url, path)
    }

    pub fn post_json(base_url: &str, path: &str, body: Value) -> Self {
        Self::new(Method::POST, base_url, path).with_body(RequestBody::Json(body))
    }

    /// Send an extra request header, e.g. `Origin` for CORS checks.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the set of acceptable status codes.
    ///
    /// # Panics
    ///
    /// Panics if `codes` is empty.
    pub fn expect_status(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        let codes: BTreeSet<u16> = codes.into_iter().collect();
        assert!(!codes.is_empty(), "expected status set must not be empty");
        self.expected_status = codes;
        self
    }

    /// Treat a 404 as an absent optional feature rather than a failure.
    pub fn optional_on_404(mut self) -> Self {
        self.optional_on_404 = true;
        self
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json(&self) -> Result<Value, String> {
        serde_json::from_str(&self.body).map_err(|e| format!("invalid JSON body: {e}"))
    }
}

/// Response validator: `Ok(message)` passes, `Err(message)` fails.
pub type Validator = Arc<dyn Fn(&HttpResponse) -> Result<String, String> + Send + Sync>;

fn status_only() -> Validator {
    Arc::new(|resp: &HttpResponse| Ok(format!("Status: {}", resp.status)))
}

/// HTTP probe checking status code and response content.
#[derive(Clone)]
pub struct HttpProbe {
    name: String,
    endpoint: Endpoint,
    client: Client,
    validator: Validator,
    optional_dependency: bool,
}

impl HttpProbe {
    pub fn new(name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
            client: Client::new(),
            validator: status_only(),
            optional_dependency: false,
        }
    }

    pub fn validate<F>(mut self, validator: F) -> Self
    where
        F: Fn(&HttpResponse) -> Result<String, String> + Send + Sync + 'static,
    {
        self.validator = Arc::new(validator);
        self
    }

    /// Mark the target as an optional external dependency: transport
    /// failures become `SkippedOptional` instead of `Fail`.
    pub fn optional_dependency(mut self) -> Self {
        self.optional_dependency = true;
        self
    }

    /// Reuse an existing client (connection pool) for this probe.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn fetch(&self) -> Result<HttpResponse, ProbeError> {
        let ep = &self.endpoint;
        let mut req = self
            .client
            .request(ep.method.clone(), ep.url())
            .timeout(ep.timeout);
        for (name, value) in &ep.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        req = match &ep.body {
            Some(RequestBody::Json(v)) => req.json(v),
            Some(RequestBody::Raw { content_type, body }) => req
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(body.clone()),
            None => req,
        };

        let resp = req
            .send()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e, ep.timeout))?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| ProbeError::from_reqwest(&e, ep.timeout))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Apply the status and validation policy to a received response.
    fn classify(&self, resp: &HttpResponse, duration: Duration) -> Verdict {
        let ep = &self.endpoint;
        if ep.expected_status.contains(&resp.status) {
            return match (self.validator)(resp) {
                Ok(msg) => Verdict::pass(msg, duration),
                Err(msg) => Verdict::fail(ProbeError::Validation(msg).to_string(), duration),
            };
        }
        if resp.status == 404 && ep.optional_on_404 {
            return Verdict::skipped(OPTIONAL_404_MESSAGE, duration);
        }
        Verdict::fail(
            ProbeError::UnexpectedStatus {
                status: resp.status,
            }
            .to_string(),
            duration,
        )
    }

    /// Run the probe and also hand back the response, for checks that chain
    /// requests.
    pub async fn execute(&self) -> (Verdict, Option<HttpResponse>) {
        let start = Instant::now();
        let result = self.fetch().await;
        let duration = start.elapsed();

        match result {
            Ok(resp) => {
                debug!(
                    url = %self.endpoint.url(),
                    status = resp.status,
                    elapsed_ms = duration.as_millis() as u64,
                    "probe response"
                );
                (self.classify(&resp, duration), Some(resp))
            }
            Err(err) => {
                debug!(url = %self.endpoint.url(), error = %err, "probe transport failure");
                let verdict = if self.optional_dependency {
                    Verdict::skipped(format!("optional dependency unavailable: {err}"), duration)
                } else {
                    Verdict::fail(err.to_string(), duration)
                };
                (verdict, None)
            }
        }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Verdict {
        self.execute().await.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::testutil::{serve, unused_base};
    use crate::results::Outcome;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    fn target() -> Router {
        Router::new()
            .route("/health", get(|| async { "" }))
            .route("/patterns", get(|| async { Json(json!(["summarize", "extract_wisdom"])) }))
            .route(
                "/chat",
                post(|Json(body): Json<Value>| async move {
                    if body.get("input").is_none() {
                        return (StatusCode::UNPROCESSABLE_ENTITY, "missing input".to_string());
                    }
                    (StatusCode::OK, "done".to_string())
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    "late"
                }),
            )
            .route(
                "/broken",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
    }

    #[tokio::test]
    async fn test_health_passes_quickly() {
        let base = serve(target()).await;
        let probe = HttpProbe::new("GET /health", Endpoint::get(&base, "/health"));
        let v = probe.run().await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "Status: 200");
        assert!(v.duration < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_404_optional_is_skipped() {
        let base = serve(target()).await;
        let probe = HttpProbe::new(
            "GET /strategies",
            Endpoint::get(&base, "/strategies").optional_on_404(),
        );
        let v = probe.run().await;
        assert_eq!(v.outcome, Outcome::SkippedOptional);
        assert!(v.message.contains("optional"));
    }

    #[tokio::test]
    async fn test_404_not_optional_fails() {
        let base = serve(target()).await;
        let probe = HttpProbe::new("GET /strategies", Endpoint::get(&base, "/strategies"));
        let v = probe.run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.contains("404"));
    }

    #[tokio::test]
    async fn test_missing_field_expected_422() {
        let base = serve(target()).await;
        let ep = Endpoint::post_json(&base, "/chat", json!({ "pattern": "summarize" }))
            .expect_status([400, 422]);
        let v = HttpProbe::new("Missing field error", ep).run().await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "Status: 422");
    }

    #[tokio::test]
    async fn test_validator_decides_outcome() {
        let base = serve(target()).await;
        let non_empty = |resp: &HttpResponse| match resp.json()? {
            Value::Array(items) if !items.is_empty() => Ok(format!("Found {} patterns", items.len())),
            other => Err(format!("expected non-empty array, got {other}")),
        };
        let v = HttpProbe::new("patterns", Endpoint::get(&base, "/patterns"))
            .validate(non_empty)
            .run()
            .await;
        assert_eq!(v.outcome, Outcome::Pass);
        assert_eq!(v.message, "Found 2 patterns");

        let v = HttpProbe::new("health as array", Endpoint::get(&base, "/health"))
            .validate(non_empty)
            .run()
            .await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn test_injection_payload_rejects_500() {
        let base = serve(target()).await;
        let payload = json!({ "input": "\"; DROP TABLE users; --", "pattern": "summarize" });
        let not_500 = |resp: &HttpResponse| {
            if resp.status == 500 {
                Err("server error on injection payload".to_string())
            } else {
                Ok(format!("Status: {}", resp.status))
            }
        };

        let hardened = Endpoint::post_json(&base, "/chat", payload.clone()).expect_status([200, 400, 404, 422]);
        let v = HttpProbe::new("SQL injection", hardened).validate(not_500).run().await;
        assert_eq!(v.outcome, Outcome::Pass);

        let fragile = Endpoint::post_json(&base, "/broken", payload).expect_status([200, 400, 404, 422]);
        let v = HttpProbe::new("SQL injection", fragile).validate(not_500).run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.contains("500"));
    }

    #[tokio::test]
    async fn test_timeout_is_distinct_from_transport() {
        let base = serve(target()).await;
        let ep = Endpoint::get(&base, "/slow").timeout(Duration::from_millis(200));
        let v = HttpProbe::new("slow", ep).run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert_eq!(v.message, "request timed out after 0.2s");
    }

    #[tokio::test]
    async fn test_unreachable_fails_unless_optional() {
        let base = unused_base();
        let ep = Endpoint::get(&base, "/api/version").timeout(Duration::from_secs(2));

        let v = HttpProbe::new("version", ep.clone()).run().await;
        assert_eq!(v.outcome, Outcome::Fail);
        assert!(v.message.starts_with("transport error"));

        let v = HttpProbe::new("version", ep).optional_dependency().run().await;
        assert_eq!(v.outcome, Outcome::SkippedOptional);
    }

    #[tokio::test]
    async fn test_request_and_response_headers() {
        let router = Router::new().route(
            "/chat",
            axum::routing::options(|headers: axum::http::HeaderMap| async move {
                let origin = headers
                    .get("origin")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                ([("access-control-allow-origin", origin)], "")
            }),
        );
        let base = serve(router).await;
        let probe = HttpProbe::new(
            "CORS preflight",
            Endpoint::new(Method::OPTIONS, &base, "/chat").header("Origin", "http://localhost:5173"),
        );
        assert_eq!(probe.endpoint().to_string(), "OPTIONS /chat");

        let (v, resp) = probe.execute().await;
        assert_eq!(v.outcome, Outcome::Pass);
        let resp = resp.unwrap();
        assert_eq!(resp.header("Access-Control-Allow-Origin"), Some("http://localhost:5173"));
        assert_eq!(resp.header("x-missing"), None);
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let ep = Endpoint::get("http://localhost:8080/", "health");
        assert_eq!(ep.url(), "http://localhost:8080/health");
        assert_eq!(ep.to_string(), "GET /health");
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn test_empty_status_set_panics() {
        let _ = Endpoint::get("http://localhost:8080", "/health").expect_status([]);
    }

    #[test]
    #[should_panic(expected = "http(s)")]
    fn test_non_http_base_panics() {
        let _ = Endpoint::get("localhost:8080", "/health");
    }
}
