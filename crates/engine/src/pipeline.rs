//! End-to-end widget resolution.
//!
//! Stages, in order: collect required fields, substitute variables, fetch
//! (concurrently in multi-source mode), normalize, reconcile joins, group,
//! and attach dynamic fields.

use futures_util::future::join_all;
use indexmap::IndexMap;
use quarry_types::{DataSpec, ProviderConfig, ResultSet, SourceMode, WidgetDefinition};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::{
    aggregate::group_rows,
    dynamic::apply_dynamic_fields,
    error::{ProviderError, ResolveError},
    join::{JoinIndex, JoinStrategy},
    normalize::normalize_record,
    provider::{FetchRequest, ProviderRegistry},
    requirements::RequiredFields,
    transform::TransformSet,
    variables::apply_variables_to_config,
};

/// Resolves a widget definition into its result set.
///
/// A definition without `data`, or whose data declares neither `source` nor
/// `sources`, resolves to an empty set without calling any provider. In
/// multi-source mode every fetch is awaited before anything is merged; if
/// any source fails, the first failure in declaration order is returned and
/// no rows are produced.
#[instrument(skip_all, fields(kind = ?definition.kind()))]
pub async fn resolve_widget_data(
    definition: &WidgetDefinition,
    variables: &Map<String, Value>,
    registry: &ProviderRegistry,
) -> Result<ResultSet, ResolveError> {
    let Some(data) = definition.data.as_ref() else {
        debug!("widget has no data section; nothing to resolve");
        return Ok(ResultSet::new());
    };
    let Some(mode) = data.mode() else {
        warn!("widget data declares neither source nor sources; returning empty result");
        return Ok(ResultSet::new());
    };

    let required = RequiredFields::collect(definition);
    let transforms = TransformSet::compile(&data.transforms);

    let rows = match mode {
        SourceMode::Single(config) => resolve_single(config, &required, &transforms, variables, registry).await?,
        SourceMode::Multi(sources) => {
            resolve_multi(data, sources, &required, &transforms, variables, registry).await?
        }
    };

    let rows = match data.active_group() {
        Some(group) => {
            let input_rows = rows.len();
            let grouped = group_rows(rows, group);
            debug!(key = %group.key, input_rows, group_count = grouped.len(), "rows grouped");
            grouped
        }
        None => rows,
    };
    let rows = apply_dynamic_fields(rows, &data.dynamic_fields);

    info!(row_count = rows.len(), "widget data resolved");
    Ok(rows)
}

async fn resolve_single(
    config: &ProviderConfig,
    required: &RequiredFields,
    transforms: &TransformSet,
    variables: &Map<String, Value>,
    registry: &ProviderRegistry,
) -> Result<ResultSet, ResolveError> {
    let config = apply_variables_to_config(config, variables);
    let fields = required.for_single_source(&config);
    let records = registry.fetch(FetchRequest::new(&config, &fields)).await.map_err(|error| {
        warn!(error = %error, "provider fetch failed");
        error
    })?;
    debug!(record_count = records.len(), "provider fetch completed");

    let prefix = config.prefix();
    Ok(records
        .into_iter()
        .map(|record| normalize_record(record, transforms, None, prefix))
        .collect())
}

async fn resolve_multi(
    data: &DataSpec,
    sources: &IndexMap<String, ProviderConfig>,
    required: &RequiredFields,
    transforms: &TransformSet,
    variables: &Map<String, Value>,
    registry: &ProviderRegistry,
) -> Result<ResultSet, ResolveError> {
    let configs = sources
        .iter()
        .map(|(source_key, config)| {
            let config = apply_variables_to_config(config, variables);
            let fields = required.for_source(source_key, sources);
            (source_key.as_str(), config, fields)
        })
        .collect::<Vec<_>>();

    let outcomes: Vec<Result<Vec<Value>, ProviderError>> = join_all(configs.iter().map(|(source_key, config, fields)| {
        registry.fetch(FetchRequest::new(config, fields).with_source_key(source_key))
    }))
    .await;

    let mut fetched = Vec::with_capacity(outcomes.len());
    for ((source_key, config, _), outcome) in configs.iter().zip(outcomes) {
        match outcome {
            Ok(records) => {
                debug!(source_key = %source_key, record_count = records.len(), "provider fetch completed");
                fetched.push((*source_key, config, records));
            }
            Err(error) => {
                warn!(source_key = %source_key, error = %error, "provider fetch failed; discarding all sources");
                return Err(ResolveError::Source {
                    source_key: (*source_key).to_string(),
                    error,
                });
            }
        }
    }

    let index = JoinIndex::build(&data.join, |source_key| configs_prefix(&configs, source_key));
    let normalized = fetched.into_iter().map(|(source_key, config, records)| {
        let prefix = config.prefix();
        let rows = records
            .into_iter()
            .map(|record| normalize_record(record, transforms, Some(source_key), prefix))
            .collect::<Vec<_>>();
        (source_key.to_string(), rows)
    });
    let rows = JoinStrategy::FirstMatchMerge.reconcile(&index, normalized);
    debug!(source_count = configs.len(), row_count = rows.len(), "sources reconciled");
    Ok(rows)
}

fn configs_prefix<'a>(configs: &'a [(&str, ProviderConfig, Vec<String>)], source_key: &str) -> Option<&'a str> {
    configs
        .iter()
        .find(|(key, _, _)| *key == source_key)
        .and_then(|(_, config, _)| config.prefix())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    struct Recording {
        records: Vec<Value>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl crate::provider::DataProvider for Recording {
        async fn fetch(&self, _request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    fn definition(value: Value) -> WidgetDefinition {
        serde_json::from_value(value).expect("widget definition")
    }

    fn registry_with(records: Vec<Value>) -> (ProviderRegistry, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ProviderRegistry::new();
        registry.register(
            "fixture",
            Arc::new(Recording {
                records,
                calls: calls.clone(),
            }),
        );
        (registry, calls)
    }

    #[tokio::test]
    async fn missing_data_makes_no_provider_call() {
        let (registry, calls) = registry_with(vec![json!({ "a": 1 })]);
        let widget = definition(json!({ "type": "metric", "metric": { "dataKey": "a" } }));

        let rows = resolve_widget_data(&widget, &Map::new(), &registry).await.expect("rows");
        assert!(rows.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn data_without_sources_is_empty() {
        let (registry, calls) = registry_with(vec![json!({ "a": 1 })]);
        let widget = definition(json!({
            "type": "metric",
            "metric": { "dataKey": "a" },
            "data": { "dynamicFields": { "b": "a * 2" } }
        }));

        let rows = resolve_widget_data(&widget, &Map::new(), &registry).await.expect("rows");
        assert!(rows.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_source_keeps_one_row_per_record() {
        let (registry, calls) = registry_with(vec![json!({ "a": 1, "b": 2 }), json!({ "a": 3, "b": 4 })]);
        let widget = definition(json!({
            "type": "table",
            "table": { "columns": [{ "dataKey": "a" }, { "dataKey": "b" }] },
            "data": {
                "source": { "provider": "fixture" },
                "transforms": { "b": { "expr": "value * 2" } }
            }
        }));

        let rows = resolve_widget_data(&widget, &Map::new(), &registry).await.expect("rows");
        assert_eq!(serde_json::to_value(&rows).expect("json"), json!([{ "a": 1, "b": 4 }, { "a": 3, "b": 8 }]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct Capturing {
        requested: Arc<Mutex<Vec<Vec<String>>>>,
    }

    #[async_trait]
    impl crate::provider::DataProvider for Capturing {
        async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<Value>, ProviderError> {
            self.requested
                .lock()
                .expect("requested lock")
                .push(request.required_fields.to_vec());
            Ok(vec![json!({ "id": "a", "fees": 2 })])
        }
    }

    #[tokio::test]
    async fn explicit_fields_still_request_dynamic_inputs() {
        let requested = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ProviderRegistry::new();
        registry.register(
            "capture",
            Arc::new(Capturing {
                requested: requested.clone(),
            }),
        );
        let widget = definition(json!({
            "type": "metric",
            "metric": { "dataKey": "feePct" },
            "data": {
                "source": { "provider": "capture", "fields": ["id"] },
                "dynamicFields": { "feePct": "fees * 100" }
            }
        }));

        let rows = resolve_widget_data(&widget, &Map::new(), &registry).await.expect("rows");
        assert_eq!(rows[0]["feePct"], json!(200));
        assert_eq!(*requested.lock().expect("requested lock"), vec![vec!["id".to_string(), "fees".to_string()]]);
    }

    #[tokio::test]
    async fn self_join_collapses_to_distinct_keys() {
        let (registry, _) = registry_with(vec![json!({ "id": 1, "v": "a" }), json!({ "id": 2, "v": "b" })]);
        let widget = definition(json!({
            "type": "table",
            "table": { "columns": [{ "dataKey": "id" }] },
            "data": {
                "sources": { "X": { "provider": "fixture" }, "Y": { "provider": "fixture" } },
                "join": { "X.id": "Y.id" }
            }
        }));

        let rows = resolve_widget_data(&widget, &Map::new(), &registry).await.expect("rows");
        assert_eq!(rows.len(), 2);
    }
}
