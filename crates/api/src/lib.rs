//! Quarry backend API client.
//!
//! This crate provides a lightweight client for the Quarry backend. It
//! focuses on:
//!
//! - Constructing an HTTP client with a bearer token from `QUARRY_API_TOKEN`
//! - Validating `QUARRY_API_URL` for safety
//! - Fetching stored widgets and the widget definition JSON schema
//!
//! The widget schema is fetched at most once per base URL for the lifetime of
//! the process; later calls are served from memory.
//!
//! # Example
//!
//! ```ignore
//! use quarry_api::QuarryClient;
//!
//! async fn show(id: &str) -> anyhow::Result<()> {
//!     let client = QuarryClient::from_env()?;
//!     let widget = client.get_widget(id).await?;
//!     println!("{:?}", widget.title);
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::env;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use once_cell::sync::Lazy;
use quarry_types::StoredWidget;
use quarry_util::{JsonRequest, build_http_client_with_headers, execute_json_request};
use reqwest::{Client, Url, header};
use serde_json::Value;
use tracing::{debug, info};

pub const API_URL_ENV: &str = "QUARRY_API_URL";
pub const API_TOKEN_ENV: &str = "QUARRY_API_TOKEN";
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hostnames allowed over plain HTTP.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Widget schemas keyed by API base URL.
static WIDGET_SCHEMA_CACHE: Lazy<Mutex<HashMap<String, Value>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Thin wrapper around a configured `reqwest::Client` for the Quarry backend.
#[derive(Debug, Clone)]
pub struct QuarryClient {
    pub base_url: String,
    pub http: Client,
    token: Option<String>,
}

impl QuarryClient {
    /// Construct a client from `QUARRY_API_URL` and `QUARRY_API_TOKEN`.
    pub fn from_env() -> Result<Self> {
        let base_url = env::var(API_URL_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let token = env::var(API_TOKEN_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self::new(base_url, token)
    }

    /// Construct a client for an explicit base URL and optional bearer token.
    ///
    /// Non-localhost hosts must use HTTPS.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let mut default_headers = header::HeaderMap::new();
        if let Some(token) = token.as_deref() {
            let mut authorization = header::HeaderValue::from_str(&format!("Bearer {token}"))
                .context("QUARRY_API_TOKEN contains characters not allowed in a header")?;
            authorization.set_sensitive(true);
            default_headers.insert(header::AUTHORIZATION, authorization);
        }
        let http = build_http_client_with_headers(DEFAULT_TIMEOUT, default_headers).context("build http client")?;

        Ok(Self { base_url, http, token })
    }

    /// Absolute URL for an API-relative path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let mut request = JsonRequest::get(self.url(path));
        if let Some(token) = self.token.as_deref() {
            request = request.with_secret(token);
        }
        debug!(path, "quarry api request");
        Ok(execute_json_request(&self.http, request).await?)
    }

    /// Fetch a stored widget by id (`GET /widgets/{id}`).
    pub async fn get_widget(&self, widget_id: &str) -> Result<StoredWidget> {
        let widget_id = widget_id.trim();
        if widget_id.is_empty() {
            return Err(anyhow!("widget id must not be empty"));
        }
        let payload = self
            .get_json(&format!("widgets/{widget_id}"))
            .await
            .with_context(|| format!("fetch widget '{widget_id}'"))?;
        let widget: StoredWidget =
            serde_json::from_value(payload).with_context(|| format!("decode widget '{widget_id}'"))?;
        info!(widget_id, kind = ?widget.definition.kind(), "fetched stored widget");
        Ok(widget)
    }

    /// Fetch the widget definition JSON schema (`GET /schemas/widget.json`).
    ///
    /// The first successful response is cached for the rest of the process.
    pub async fn widget_schema(&self) -> Result<Value> {
        if let Some(cached) = cached_widget_schema(&self.base_url) {
            debug!(base_url = %self.base_url, "widget schema served from cache");
            return Ok(cached);
        }

        let schema = self.get_json("schemas/widget.json").await.context("fetch widget schema")?;
        let mut cache = WIDGET_SCHEMA_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let stored = cache.entry(self.base_url.clone()).or_insert(schema);
        Ok(stored.clone())
    }
}

fn cached_widget_schema(base_url: &str) -> Option<Value> {
    WIDGET_SCHEMA_CACHE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(base_url)
        .cloned()
}

/// Validate that a base URL is acceptable for use by the client.
///
/// `localhost` and `127.0.0.1` may use any scheme; every other host must use HTTPS.
fn validate_base_url(base: &str) -> Result<()> {
    let parsed_base_url = Url::parse(base).map_err(|error| anyhow!("Invalid {API_URL_ENV} '{base}': {error}"))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| anyhow!("{API_URL_ENV} must include a host"))?;

    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(anyhow!(
            "{API_URL_ENV} must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn validate_base_url_requires_https_off_localhost() {
        assert!(validate_base_url("http://localhost:8000").is_ok());
        assert!(validate_base_url("http://127.0.0.1:9000").is_ok());
        assert!(validate_base_url("https://api.quarry.example").is_ok());
        assert!(validate_base_url("http://api.quarry.example").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn from_env_falls_back_to_default_url() {
        temp_env::with_vars([(API_URL_ENV, None::<&str>), (API_TOKEN_ENV, None)], || {
            let client = QuarryClient::from_env().expect("client");
            assert_eq!(client.base_url, DEFAULT_API_URL);
            assert_eq!(client.url("/widgets/1"), "http://localhost:8000/widgets/1");
        });
    }

    #[tokio::test]
    async fn get_widget_sends_bearer_token_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/widgets/w-1"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "w-1",
                "title": "Pools",
                "tags": ["defi"],
                "definition": {
                    "type": "table",
                    "data": { "source": { "provider": "graph", "subgraphId": "abc", "entity": "pools" } },
                    "table": { "columns": [{ "dataKey": "id" }] }
                }
            })))
            .mount(&server)
            .await;

        let client = QuarryClient::new(server.uri(), Some("tok".into())).expect("client");
        let widget = client.get_widget("w-1").await.expect("widget");
        assert_eq!(widget.id, "w-1");
        assert_eq!(widget.title.as_deref(), Some("Pools"));
        assert_eq!(widget.tags, vec!["defi".to_string()]);
    }

    #[tokio::test]
    async fn widget_schema_is_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/schemas/widget.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "title": "Widget" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = QuarryClient::new(server.uri(), None).expect("client");
        let first = client.widget_schema().await.expect("first");
        let second = client.widget_schema().await.expect("second");
        assert_eq!(first, second);
        assert_eq!(first["title"], "Widget");
    }

    #[tokio::test]
    async fn get_widget_rejects_blank_id() {
        let client = QuarryClient::new(DEFAULT_API_URL, None).expect("client");
        assert!(client.get_widget("  ").await.is_err());
    }
}
