//! Provider adapters and the registry that dispatches to them.
//!
//! Modules:
//! - `graph`: GraphQL/subgraph adapter, endpoint addressing, schema introspection
//! - `ipfs`: content-addressed (IPFS) and name-addressed (IPNS) documents
//! - `http`: generic JSON-over-HTTP adapter
//! - `inline`: records embedded directly in the configuration
//! - `registry`: kind-to-adapter dispatch

mod graph;
mod http;
mod inline;
mod ipfs;
mod registry;

pub use graph::{GraphEndpoints, GraphProvider, build_graph_query, subgraph_endpoint};
pub use http::HttpProvider;
pub use inline::InlineProvider;
pub use ipfs::{GatewayNamespace, IpfsProvider, gateway_url};
pub use registry::ProviderRegistry;

use async_trait::async_trait;
use quarry_types::ProviderConfig;
use serde_json::Value;

use crate::error::ProviderError;

/// Everything an adapter needs to fetch one source.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Source configuration with variables already substituted.
    pub config: &'a ProviderConfig,
    /// Fields the widget reads from this source.
    pub required_fields: &'a [String],
    /// Source key in multi-source mode.
    pub source_key: Option<&'a str>,
}

impl<'a> FetchRequest<'a> {
    pub fn new(config: &'a ProviderConfig, required_fields: &'a [String]) -> Self {
        Self {
            config,
            required_fields,
            source_key: None,
        }
    }

    pub fn with_source_key(mut self, source_key: &'a str) -> Self {
        self.source_key = Some(source_key);
        self
    }

    /// Label used in logs and error messages.
    pub fn label(&self) -> &str {
        self.source_key.unwrap_or("source")
    }

    pub(crate) fn require_str(&self, key: &str) -> Result<&'a str, ProviderError> {
        let config: &'a ProviderConfig = self.config;
        config
            .get_str(key)
            .ok_or_else(|| ProviderError::config(format!("{} is missing required key '{key}'", self.label())))
    }
}

/// An adapter turning a source configuration into raw records.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Fetches the records for one source.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError>;
}
