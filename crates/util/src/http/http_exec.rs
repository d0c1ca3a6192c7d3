//! HTTP execution shared by every provider adapter.
//!
//! Requests are described by [`JsonRequest`] and executed with
//! [`execute_json_request`], which parses the body as JSON and classifies
//! failures so callers can tell a missing resource (404) apart from other
//! transport errors.

use std::time::{Duration, Instant};

use reqwest::{
    Client, Method,
    header::{self, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::parser::{JsonParseError, parse_response_json_strict, status_error_message, truncate_response_preview};
use crate::redaction::{redact_secret, redact_sensitive};

const USER_AGENT: &str = concat!("quarry/", env!("CARGO_PKG_VERSION"));

/// Transport-level failure while fetching a JSON document.
#[derive(Debug, Error)]
pub enum HttpFetchError {
    /// The server answered 404; content may be unpublished or not yet propagated.
    #[error("resource not found at {url}")]
    NotFound { url: String },
    /// Any other non-success status.
    #[error("HTTP {status} from {url}: {detail}")]
    Status { url: String, status: u16, detail: String },
    /// Connection, DNS, TLS, or timeout failure.
    #[error("network error for {url}: {message}. Hint: check connection/proxy settings")]
    Network { url: String, message: String },
    /// The request could not be built (bad method, header, or URL).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The body was not valid JSON.
    #[error(transparent)]
    Json(#[from] JsonParseError),
}

impl HttpFetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A JSON request to execute.
#[derive(Debug, Clone)]
pub struct JsonRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Secret embedded in the URL or headers that must not appear in logs.
    pub secret: Option<String>,
}

impl JsonRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            secret: None,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.trim().is_empty() {
            self.secret = Some(secret);
        }
        self
    }

    /// URL safe to log or surface in errors.
    pub fn display_url(&self) -> String {
        match self.secret.as_deref() {
            Some(secret) => redact_secret(&self.url, secret),
            None => redact_sensitive(&self.url),
        }
    }
}

/// Build the shared HTTP client used by provider adapters.
pub fn build_http_client(timeout: Duration) -> Result<Client, HttpFetchError> {
    build_http_client_with_headers(timeout, HeaderMap::new())
}

/// Build an HTTP client that sends `default_headers` on every request.
pub fn build_http_client_with_headers(timeout: Duration, mut default_headers: HeaderMap) -> Result<Client, HttpFetchError> {
    default_headers
        .entry(header::ACCEPT)
        .or_insert(HeaderValue::from_static("application/json"));

    Client::builder()
        .default_headers(default_headers)
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .map_err(|error| HttpFetchError::InvalidRequest(format!("could not build the HTTP client: {error}")))
}

/// Execute a request and parse the response body as JSON.
///
/// Returns `Value::Null` for an empty successful body.
pub async fn execute_json_request(client: &Client, request: JsonRequest) -> Result<Value, HttpFetchError> {
    let start = Instant::now();
    let display_url = request.display_url();
    debug!(
        method = %request.method,
        url = %display_url,
        query_parameter_count = request.query.len(),
        has_body = request.body.is_some(),
        "http request started"
    );

    let mut builder = client.request(request.method.clone(), request.url.as_str());
    for (name, value) in &request.headers {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|error| HttpFetchError::InvalidRequest(format!("header '{name}': {error}")))?;
        let header_value =
            HeaderValue::from_str(value).map_err(|error| HttpFetchError::InvalidRequest(format!("header '{name}': {error}")))?;
        builder = builder.header(header_name, header_value);
    }
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if let Some(body) = request.body.as_ref() {
        builder = builder.json(body);
    }

    let response = builder.send().await.map_err(|error| {
        warn!(url = %display_url, error = %error, "http request failed to send");
        HttpFetchError::Network {
            url: display_url.clone(),
            message: redact_secret(&error.to_string(), request.secret.as_deref().unwrap_or_default()),
        }
    })?;

    let status = response.status();
    let body_text = response.text().await.map_err(|error| HttpFetchError::Network {
        url: display_url.clone(),
        message: error.to_string(),
    })?;

    if !status.is_success() {
        warn!(
            url = %display_url,
            status = %status,
            duration_ms = start.elapsed().as_millis(),
            "http request returned error status"
        );
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(HttpFetchError::NotFound { url: display_url });
        }
        let preview = truncate_response_preview(&body_text, 200);
        let detail = match status_error_message(status.as_u16()) {
            Some(hint) => format!("{hint}. body: {preview}"),
            None => preview,
        };
        return Err(HttpFetchError::Status {
            url: display_url,
            status: status.as_u16(),
            detail,
        });
    }

    if body_text.trim().is_empty() {
        debug!(url = %display_url, status = %status, "http request completed with empty response");
        return Ok(Value::Null);
    }

    let parsed = parse_response_json_strict(&body_text, Some(status)).inspect_err(|error| {
        warn!(url = %display_url, body_len = body_text.len(), error = %error, "http response JSON parse failed");
    })?;
    debug!(
        url = %display_url,
        status = %status,
        duration_ms = start.elapsed().as_millis(),
        "http request completed"
    );
    Ok(parsed)
}

/// Flattens a JSON map into query pairs; arrays repeat the key.
pub fn build_query_pairs(query_parameters: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query_parameters {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), query_value_to_string(item)));
                }
            }
            other => pairs.push((key.clone(), query_value_to_string(other))),
        }
    }
    pairs
}

fn query_value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
