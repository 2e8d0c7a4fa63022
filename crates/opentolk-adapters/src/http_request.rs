//! HTTP call helper -- send one request with a method, headers, optional
//! body and timeout, returning the status and body text.
//!
//! Non-success statuses are returned, not raised; callers decide whether a
//! 4xx/5xx is a failure.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{AdapterError, Result};

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum response body size in bytes (1 MB).
const MAX_BODY_BYTES: usize = 1_024 * 1_024;

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpBody {
    /// Sent verbatim.
    Text(String),
    /// Serialized with `Content-Type: application/json`.
    Json(serde_json::Value),
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct HttpCall {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<HttpBody>,
    pub timeout: Duration,
}

impl HttpCall {
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: HttpBody) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Send `call` with `client`.
pub async fn send_http(client: &reqwest::Client, call: &HttpCall) -> Result<HttpResponse> {
    let method = parse_method(&call.method).ok_or_else(|| {
        AdapterError::invalid(
            "http",
            format!(
                "unsupported HTTP method `{}`. Supported: GET, POST, PUT, PATCH, DELETE, HEAD",
                call.method
            ),
        )
    })?;
    url::Url::parse(&call.url)
        .map_err(|e| AdapterError::invalid("http", format!("invalid URL `{}`: {e}", call.url)))?;

    let mut request = client.request(method, &call.url).timeout(call.timeout);
    for (name, value) in &call.headers {
        let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AdapterError::invalid("http", format!("invalid header name `{name}`: {e}")))?;
        let header_value = reqwest::header::HeaderValue::from_str(value).map_err(|e| {
            AdapterError::invalid("http", format!("invalid header value for `{name}`: {e}"))
        })?;
        request = request.header(header_name, header_value);
    }
    request = match &call.body {
        Some(HttpBody::Text(text)) => request.body(text.clone()),
        Some(HttpBody::Json(value)) => request.json(value),
        None => request,
    };

    let timeout_secs = call.timeout.as_secs();
    let map_send_error = |e: reqwest::Error| {
        if e.is_timeout() {
            AdapterError::Timeout {
                seconds: timeout_secs,
                reason: format!("HTTP request to `{}` timed out", call.url),
            }
        } else {
            AdapterError::ExecutionFailed {
                tool_name: "http".into(),
                reason: format!("HTTP request failed: {e}"),
            }
        }
    };

    let start = Instant::now();
    let response = request.send().await.map_err(map_send_error)?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(map_send_error)?;

    let body = if bytes.len() > MAX_BODY_BYTES {
        let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_BYTES]);
        format!("{truncated}\n... [body truncated at 1 MB]")
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };

    debug!(
        method = %call.method,
        url = %call.url,
        status,
        elapsed_ms = start.elapsed().as_millis() as u64,
        body_length = bytes.len(),
        "HTTP request completed"
    );

    Ok(HttpResponse { status, body })
}

/// Parse an HTTP method string into a `reqwest::Method`.
fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.trim().to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}
