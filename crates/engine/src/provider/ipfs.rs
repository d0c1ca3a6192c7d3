//! IPFS and IPNS document adapters.
//!
//! Both fetch a JSON document through an HTTP gateway and shape it into
//! records. A 404 from the gateway usually means the content is unpublished
//! or has not propagated yet; it surfaces as [`ProviderError::is_not_found`].

use async_trait::async_trait;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use quarry_types::ProviderConfig;
use quarry_util::{JsonRequest, execute_json_request, extract_collection_items};
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use super::{DataProvider, FetchRequest};
use crate::error::ProviderError;

const PATH_KEY: &str = "path";

/// Characters escaped in content identifiers; `/` is kept so a CID may
/// address a file inside a directory.
const CONTENT_PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'{')
    .add(b'}');

/// Which gateway namespace a document lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayNamespace {
    /// Content-addressed: config key `cid` (alias `hash`).
    Ipfs,
    /// Name-addressed: config key `name`.
    Ipns,
}

impl GatewayNamespace {
    fn segment(self) -> &'static str {
        match self {
            Self::Ipfs => "ipfs",
            Self::Ipns => "ipns",
        }
    }

    fn identifier<'a>(self, request: &FetchRequest<'a>) -> Result<&'a str, ProviderError> {
        match self {
            Self::Ipfs => {
                let config: &'a ProviderConfig = request.config;
                config.get_str("cid").or_else(|| config.get_str("hash")).ok_or_else(|| {
                    ProviderError::config(format!("{} is missing required key 'cid'", request.label()))
                })
            }
            Self::Ipns => request.require_str("name"),
        }
    }
}

/// Builds `{gateway}/{ipfs|ipns}/{identifier}`.
///
/// ```rust
/// use quarry_engine::provider::{GatewayNamespace, gateway_url};
///
/// assert_eq!(gateway_url("https://ipfs.io/", GatewayNamespace::Ipfs, "QmHash"), "https://ipfs.io/ipfs/QmHash");
/// assert_eq!(gateway_url("https://ipfs.io", GatewayNamespace::Ipns, "k51/dash.json"), "https://ipfs.io/ipns/k51/dash.json");
/// ```
pub fn gateway_url(gateway: &str, namespace: GatewayNamespace, identifier: &str) -> String {
    let identifier = identifier.trim().trim_start_matches('/');
    format!(
        "{}/{}/{}",
        gateway.trim_end_matches('/'),
        namespace.segment(),
        utf8_percent_encode(identifier, CONTENT_PATH_ENCODE_SET)
    )
}

/// Adapter for documents served by an IPFS HTTP gateway.
#[derive(Debug, Clone)]
pub struct IpfsProvider {
    client: Client,
    gateway: String,
    namespace: GatewayNamespace,
}

impl IpfsProvider {
    pub fn new(client: Client, gateway: impl Into<String>, namespace: GatewayNamespace) -> Self {
        Self {
            client,
            gateway: gateway.into(),
            namespace,
        }
    }

    /// Fetches the raw JSON document for an identifier.
    pub async fn fetch_document(&self, identifier: &str) -> Result<Value, ProviderError> {
        let url = gateway_url(&self.gateway, self.namespace, identifier);
        Ok(execute_json_request(&self.client, JsonRequest::get(url)).await?)
    }
}

#[async_trait]
impl DataProvider for IpfsProvider {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
        let identifier = self.namespace.identifier(&request)?;
        let document = self.fetch_document(identifier).await?;
        let records = extract_collection_items(document, request.config.get_str(PATH_KEY));
        info!(
            source = request.label(),
            namespace = self.namespace.segment(),
            identifier,
            record_count = records.len(),
            "gateway fetch completed"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_accepts_hash_alias() {
        let config = ProviderConfig::from_value(json!({ "provider": "ipfs", "hash": "QmAlias" })).expect("config");
        let request = FetchRequest::new(&config, &[]);
        assert_eq!(GatewayNamespace::Ipfs.identifier(&request).expect("identifier"), "QmAlias");
    }

    #[test]
    fn missing_identifier_is_a_config_error() {
        let config = ProviderConfig::from_value(json!({ "provider": "ipns" })).expect("config");
        let request = FetchRequest::new(&config, &[]);
        let error = GatewayNamespace::Ipns.identifier(&request).expect_err("missing name");
        assert!(matches!(error, ProviderError::Config(_)));
    }

    #[test]
    fn gateway_url_escapes_unsafe_characters() {
        assert_eq!(
            gateway_url("https://gw.example", GatewayNamespace::Ipfs, "Qm dir/a b.json"),
            "https://gw.example/ipfs/Qm%20dir/a%20b.json"
        );
    }
}
