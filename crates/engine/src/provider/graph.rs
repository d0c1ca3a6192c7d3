//! GraphQL adapter for subgraphs served by The Graph.
//!
//! A source looks like:
//!
//! ```json
//! { "provider": "graph", "subgraphId": "Qm...", "entity": "pools",
//!   "orderBy": "volumeUSD", "orderDirection": "desc", "first": 10,
//!   "filters": { "where": { "volumeUSD_gt": "$minVolume" } } }
//! ```
//!
//! Required fields become the selection set (dotted paths nest), and the
//! remaining keys become the entity's argument list.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use quarry_util::{JsonRequest, execute_json_request};
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::{DataProvider, FetchRequest};
use crate::error::ProviderError;
use crate::settings::EngineSettings;

const SUBGRAPH_ID_KEY: &str = "subgraphId";
const ENTITY_KEY: &str = "entity";
const FILTERS_KEY: &str = "filters";
const DEFAULT_SELECTION: &str = "id";

const INTROSPECTION_QUERY: &str = r#"query IntrospectionQuery {
  __schema {
    types {
      ...FullType
    }
  }
}

fragment FullType on __Type {
  kind
  name
  fields(includeDeprecated: true) {
    name
    args {
      ...InputValue
    }
    type {
      ...TypeRef
    }
  }
}

fragment InputValue on __InputValue {
  name
  description
  type {
    ...TypeRef
  }
  defaultValue
}

fragment TypeRef on __Type {
  kind
  name
  ofType {
    kind
    name
    ofType {
      kind
      name
      ofType {
        kind
        name
      }
    }
  }
}"#;

/// Introspection results keyed by subgraph id, filled on first read.
static SUBGRAPH_SCHEMA_CACHE: Lazy<Mutex<HashMap<String, Value>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Where subgraph queries are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoints {
    pub api_url: String,
    pub hosted_service_url: String,
    pub api_key: String,
}

/// Snapshots the settings; later changes to them are not observed.
impl From<&EngineSettings> for GraphEndpoints {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            api_url: settings.graph_api_url.clone(),
            hosted_service_url: settings.graph_hosted_service_url.clone(),
            api_key: settings.graph_api_key.clone(),
        }
    }
}

/// Resolves the query URL for a subgraph.
///
/// Ids in `author/name` form address the hosted service; anything else is a
/// deployment id on the keyed gateway.
///
/// ```rust
/// use quarry_engine::provider::{GraphEndpoints, subgraph_endpoint};
///
/// let endpoints = GraphEndpoints {
///     api_url: "https://gateway.thegraph.com/api".into(),
///     hosted_service_url: "https://api.thegraph.com/subgraphs/name".into(),
///     api_key: "k".into(),
/// };
/// assert_eq!(
///     subgraph_endpoint(&endpoints, "uniswap/uniswap-v3"),
///     "https://api.thegraph.com/subgraphs/name/uniswap/uniswap-v3"
/// );
/// assert_eq!(
///     subgraph_endpoint(&endpoints, "QmAbc"),
///     "https://gateway.thegraph.com/api/k/subgraphs/id/QmAbc"
/// );
/// ```
pub fn subgraph_endpoint(endpoints: &GraphEndpoints, subgraph_id: &str) -> String {
    if is_hosted_service(subgraph_id) {
        format!("{}/{subgraph_id}", endpoints.hosted_service_url)
    } else {
        format!("{}/{}/subgraphs/id/{subgraph_id}", endpoints.api_url, endpoints.api_key)
    }
}

fn is_hosted_service(subgraph_id: &str) -> bool {
    subgraph_id.contains('/')
}

/// Adapter for subgraph GraphQL endpoints.
#[derive(Debug, Clone)]
pub struct GraphProvider {
    client: Client,
    endpoints: GraphEndpoints,
}

impl GraphProvider {
    pub fn new(client: Client, endpoints: GraphEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &GraphEndpoints {
        &self.endpoints
    }

    async fn post_query(&self, subgraph_id: &str, query: String) -> Result<Value, ProviderError> {
        let url = subgraph_endpoint(&self.endpoints, subgraph_id);
        let mut request = JsonRequest::post_json(url, json!({ "query": query }));
        if !is_hosted_service(subgraph_id) {
            request = request.with_secret(self.endpoints.api_key.clone());
        }
        let response = execute_json_request(&self.client, request).await?;

        if let Some(errors) = response.get("errors").filter(|errors| !errors.is_null()) {
            warn!(subgraph_id, errors = %errors, "subgraph query returned errors");
            return Err(ProviderError::Query {
                target: format!("subgraph {subgraph_id}"),
                errors: errors.clone(),
            });
        }
        Ok(response)
    }

    /// Introspects a subgraph's schema, caching the result for the process lifetime.
    pub async fn subgraph_schema(&self, subgraph_id: &str) -> Result<Value, ProviderError> {
        let subgraph_id = subgraph_id.trim();
        if subgraph_id.is_empty() {
            return Err(ProviderError::config("subgraph id must not be empty"));
        }
        let cached = lock_schema_cache().get(subgraph_id).cloned();
        if let Some(cached) = cached {
            debug!(subgraph_id, "subgraph schema served from cache");
            return Ok(cached);
        }

        let response = self.post_query(subgraph_id, INTROSPECTION_QUERY.to_string()).await?;
        let schema = response.get("data").cloned().unwrap_or(Value::Null);
        info!(subgraph_id, "subgraph schema fetched");
        Ok(lock_schema_cache().entry(subgraph_id.to_string()).or_insert(schema).clone())
    }
}

fn lock_schema_cache() -> std::sync::MutexGuard<'static, HashMap<String, Value>> {
    SUBGRAPH_SCHEMA_CACHE.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl DataProvider for GraphProvider {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
        let subgraph_id = request.require_str(SUBGRAPH_ID_KEY)?;
        let entity = request.require_str(ENTITY_KEY)?;

        let arguments = query_arguments(request.config.as_map());
        let query = build_graph_query(entity, &arguments, request.required_fields);
        debug!(source = request.label(), subgraph_id, entity, query = %query, "subgraph query built");

        let response = self.post_query(subgraph_id, query).await?;
        let records = match response.get("data").and_then(|data| data.get(entity)) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(single) => vec![single.clone()],
        };
        info!(source = request.label(), subgraph_id, entity, record_count = records.len(), "subgraph fetch completed");
        Ok(records)
    }
}

/// Collects the entity arguments from a source configuration.
///
/// `orderBy`, `orderDirection`, `skip` (default 0) and `first` come first,
/// then every entry of `filters`. Null arguments are dropped.
fn query_arguments(config: &Map<String, Value>) -> Map<String, Value> {
    let mut arguments = Map::new();
    for key in ["orderBy", "orderDirection", "skip", "first"] {
        if let Some(value) = config.get(key) {
            arguments.insert(key.to_string(), value.clone());
        }
    }
    arguments.entry("skip").or_insert_with(|| Value::from(0));
    if let Some(Value::Object(filters)) = config.get(FILTERS_KEY) {
        for (key, value) in filters {
            arguments.insert(key.clone(), value.clone());
        }
    }
    arguments.retain(|_, value| !value.is_null());
    arguments
}

#[derive(Debug, Default)]
struct Selection(IndexMap<String, Selection>);

impl Selection {
    fn insert(&mut self, path: &str) {
        let mut node = self;
        for segment in path.split('.') {
            if segment.chars().all(|ch| ch.is_ascii_digit()) {
                continue;
            }
            node = node.0.entry(segment.to_string()).or_default();
        }
    }

    fn render(&self, depth: usize, output: &mut String) {
        let indent = "  ".repeat(depth);
        for (name, children) in &self.0 {
            if children.0.is_empty() {
                output.push_str(&format!("{indent}{name}\n"));
            } else {
                output.push_str(&format!("{indent}{name} {{\n"));
                children.render(depth + 1, output);
                output.push_str(&format!("{indent}}}\n"));
            }
        }
    }
}

/// Builds the GraphQL document for one entity query.
///
/// ```rust
/// use quarry_engine::provider::build_graph_query;
/// use serde_json::json;
///
/// let arguments = json!({ "first": 2, "orderBy": "volume" });
/// let query = build_graph_query(
///     "pools",
///     arguments.as_object().expect("object"),
///     &["id".to_string(), "token.symbol".to_string()],
/// );
/// assert_eq!(
///     query,
///     "query {\n  pools(first: 2, orderBy: \"volume\") {\n    id\n    token {\n      symbol\n    }\n  }\n}"
/// );
/// ```
pub fn build_graph_query(entity: &str, arguments: &Map<String, Value>, fields: &[String]) -> String {
    let mut selection = Selection::default();
    for field in fields {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !field.split('.').all(|segment| is_graphql_name(segment) || segment.chars().all(|ch| ch.is_ascii_digit())) {
            warn!(field, entity, "skipping field that is not a valid GraphQL selection");
            continue;
        }
        selection.insert(field);
    }
    if selection.0.is_empty() {
        selection.insert(DEFAULT_SELECTION);
    }

    let rendered_arguments = arguments
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| format!("{key}: {}", render_argument(value)))
        .collect::<Vec<_>>();

    let mut query = String::from("query {\n");
    if rendered_arguments.is_empty() {
        query.push_str(&format!("  {entity} {{\n"));
    } else {
        query.push_str(&format!("  {entity}({}) {{\n", rendered_arguments.join(", ")));
    }
    selection.render(2, &mut query);
    query.push_str("  }\n}");
    query
}

fn render_argument(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(text) => Value::String(text.clone()).to_string(),
        Value::Array(items) => format!("[{}]", items.iter().map(render_argument).collect::<Vec<_>>().join(", ")),
        Value::Object(map) => format!(
            "{{{}}}",
            map.iter()
                .map(|(key, value)| format!("{key}: {}", render_argument(value)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn is_graphql_name(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> GraphEndpoints {
        GraphEndpoints {
            api_url: "https://gateway.example/api".into(),
            hosted_service_url: "https://hosted.example/subgraphs/name".into(),
            api_key: "secret-key".into(),
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn endpoint_depends_on_subgraph_id_shape() {
        assert_eq!(
            subgraph_endpoint(&endpoints(), "QmDeployment"),
            "https://gateway.example/api/secret-key/subgraphs/id/QmDeployment"
        );
        assert_eq!(
            subgraph_endpoint(&endpoints(), "author/name"),
            "https://hosted.example/subgraphs/name/author/name"
        );
    }

    #[test]
    fn arguments_default_skip_spread_filters_and_drop_nulls() {
        let arguments = query_arguments(&object(json!({
            "provider": "graph",
            "subgraphId": "x",
            "entity": "pools",
            "orderBy": "volume",
            "first": null,
            "filters": { "where": { "owner": "0xabc" }, "block": null }
        })));
        assert_eq!(
            Value::Object(arguments),
            json!({ "orderBy": "volume", "skip": 0, "where": { "owner": "0xabc" } })
        );
    }

    #[test]
    fn query_nests_dotted_fields_and_renders_objects() {
        let query = build_graph_query(
            "swaps",
            &object(json!({ "skip": 0, "where": { "amount_gt": 5, "pair_in": ["a", "b"] } })),
            &["id".into(), "pair.token0.symbol".into(), "pair.token1.symbol".into(), "items.0.id".into()],
        );
        assert_eq!(
            query,
            "query {\n  swaps(skip: 0, where: {amount_gt: 5, pair_in: [\"a\", \"b\"]}) {\n    id\n    pair {\n      token0 {\n        symbol\n      }\n      token1 {\n        symbol\n      }\n    }\n    items {\n      id\n    }\n  }\n}"
        );
    }

    #[test]
    fn query_falls_back_to_id_and_skips_invalid_names() {
        let query = build_graph_query("tokens", &Map::new(), &["bad-name".into(), " ".into()]);
        assert_eq!(query, "query {\n  tokens {\n    id\n  }\n}");
    }
}
