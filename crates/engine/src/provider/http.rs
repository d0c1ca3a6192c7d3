//! Generic JSON-over-HTTP adapter.
//!
//! Config keys: `url` (required), `method` (default `GET`), `headers`
//! (string map), `params` (query parameters), `body` (JSON), and `path`
//! (dotted selection of the record array inside the response).

use async_trait::async_trait;
use quarry_util::{JsonRequest, build_query_pairs, execute_json_request, extract_collection_items};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::info;

use super::{DataProvider, FetchRequest};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: Client,
}

impl HttpProvider {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn build_request(request: &FetchRequest<'_>) -> Result<JsonRequest, ProviderError> {
    let url = request.require_str("url")?;
    let method = match request.config.get_str("method") {
        Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .map_err(|_| ProviderError::config(format!("{} has invalid HTTP method '{method}'", request.label())))?,
        None => Method::GET,
    };

    let mut json_request = JsonRequest::new(method, url);
    if let Some(headers) = request.config.get("headers") {
        let Value::Object(headers) = headers else {
            return Err(ProviderError::config(format!("{} headers must be an object", request.label())));
        };
        for (name, value) in headers {
            let value = match value {
                Value::String(text) => text.clone(),
                Value::Null => continue,
                other => other.to_string(),
            };
            json_request.headers.push((name.clone(), value));
        }
    }
    if let Some(params) = request.config.get("params") {
        let Value::Object(params) = params else {
            return Err(ProviderError::config(format!("{} params must be an object", request.label())));
        };
        json_request.query = build_query_pairs(params);
    }
    json_request.body = request.config.get("body").filter(|body| !body.is_null()).cloned();
    Ok(json_request)
}

#[async_trait]
impl DataProvider for HttpProvider {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
        let json_request = build_request(&request)?;
        let url = json_request.display_url();
        let document = execute_json_request(&self.client, json_request).await?;
        let records = extract_collection_items(document, request.config.get_str("path"));
        info!(source = request.label(), url = %url, record_count = records.len(), "http fetch completed");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::ProviderConfig;
    use serde_json::json;

    fn config(value: Value) -> ProviderConfig {
        ProviderConfig::from_value(value).expect("config")
    }

    #[test]
    fn builds_request_from_config() {
        let config = config(json!({
            "provider": "http",
            "url": "https://api.example/pools",
            "method": "post",
            "headers": { "x-api-key": "k", "x-retry": 2, "x-skip": null },
            "params": { "chain": ["eth", "base"] },
            "body": { "limit": 5 }
        }));
        let request = build_request(&FetchRequest::new(&config, &[])).expect("request");

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url, "https://api.example/pools");
        assert_eq!(
            request.headers,
            vec![("x-api-key".to_string(), "k".to_string()), ("x-retry".to_string(), "2".to_string())]
        );
        assert_eq!(
            request.query,
            vec![("chain".to_string(), "eth".to_string()), ("chain".to_string(), "base".to_string())]
        );
        assert_eq!(request.body, Some(json!({ "limit": 5 })));
    }

    #[test]
    fn rejects_malformed_config() {
        let missing_url = config(json!({ "provider": "http" }));
        assert!(matches!(
            build_request(&FetchRequest::new(&missing_url, &[])),
            Err(ProviderError::Config(_))
        ));

        let bad_headers = config(json!({ "provider": "http", "url": "https://a.example", "headers": ["x"] }));
        assert!(build_request(&FetchRequest::new(&bad_headers, &[])).is_err());
    }
}
