use std::{collections::HashMap, fmt, sync::Arc};

use anyhow::{Context, Result};
use quarry_types::ProviderConfig;
use quarry_util::build_http_client;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{DataProvider, FetchRequest, GatewayNamespace, GraphEndpoints, GraphProvider, HttpProvider, InlineProvider, IpfsProvider};
use crate::{error::ProviderError, settings::EngineSettings};

/// Maps adapter kinds (`graph`, `ipfs`, ...) to the adapter serving them.
///
/// Kinds are matched case-insensitively. A config without a `provider` key
/// is dispatched on its shape: `subgraphId` means graph, `cid`/`hash` means
/// ipfs, `name` means ipns, `url` means http, `records` means inline.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn DataProvider>>,
    graph: Option<Arc<GraphProvider>>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.providers.keys().collect::<Vec<_>>();
        kinds.sort_unstable();
        f.debug_struct("ProviderRegistry").field("kinds", &kinds).finish()
    }
}

impl ProviderRegistry {
    /// Empty registry; adapters are added with [`ProviderRegistry::register`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in adapter, sharing one HTTP client.
    pub fn with_defaults(settings: &EngineSettings) -> Result<Self> {
        let client = build_http_client(settings.http_timeout).context("failed to build provider http client")?;
        let graph = Arc::new(GraphProvider::new(client.clone(), GraphEndpoints::from(settings)));

        let mut registry = Self::new();
        registry.register("graph", graph.clone());
        registry.register("subgraph", graph.clone());
        registry.register(
            "ipfs",
            Arc::new(IpfsProvider::new(client.clone(), settings.ipfs_gateway.clone(), GatewayNamespace::Ipfs)),
        );
        registry.register(
            "ipns",
            Arc::new(IpfsProvider::new(client.clone(), settings.ipns_gateway.clone(), GatewayNamespace::Ipns)),
        );
        registry.register("http", Arc::new(HttpProvider::new(client)));
        registry.register("inline", Arc::new(InlineProvider));
        registry.register("static", Arc::new(InlineProvider));
        registry.graph = Some(graph);
        Ok(registry)
    }

    /// Registers `provider` under `kind`, replacing any earlier adapter.
    pub fn register(&mut self, kind: impl Into<String>, provider: Arc<dyn DataProvider>) {
        self.providers.insert(kind.into().to_ascii_lowercase(), provider);
    }

    /// The built-in graph adapter, used for schema introspection.
    pub fn graph(&self) -> Option<&GraphProvider> {
        self.graph.as_deref()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds = self.providers.keys().map(String::as_str).collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds
    }

    /// Dispatches a fetch to the adapter for the config's kind.
    #[instrument(skip_all, fields(source = request.label()))]
    pub async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
        let kind = resolve_kind(request.config)
            .ok_or_else(|| ProviderError::config(format!("{} does not declare a provider kind", request.label())))?;
        let provider = self.providers.get(&kind).ok_or_else(|| ProviderError::UnknownKind {
            kind: kind.clone(),
            known: self.kinds().join(", "),
        })?;
        debug!(kind = %kind, field_count = request.required_fields.len(), "dispatching provider fetch");
        provider.fetch(request).await
    }
}

fn resolve_kind(config: &ProviderConfig) -> Option<String> {
    if let Some(kind) = config.kind() {
        return Some(kind);
    }
    let inferred = if config.get_str("subgraphId").is_some() {
        "graph"
    } else if config.get_str("cid").is_some() || config.get_str("hash").is_some() {
        "ipfs"
    } else if config.get_str("name").is_some() {
        "ipns"
    } else if config.get_str("url").is_some() {
        "http"
    } else if config.get("records").is_some() {
        "inline"
    } else {
        return None;
    };
    Some(inferred.to_string())
}
