//! Collecting the fields a widget needs from its providers.
//!
//! The collector is conservative: requesting a field that is never read is
//! harmless, while missing one leaves a chart series or dynamic field empty.

use indexmap::{IndexMap, IndexSet};
use quarry_types::{ProviderConfig, TransformSpec, WidgetDefinition};

use crate::expression::referenced_fields;

/// Identifier bound to the current field value inside transform expressions.
const TRANSFORM_VALUE_IDENTIFIER: &str = "value";

/// Deduplicated set of field names a widget reads from provider results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields {
    fields: IndexSet<String>,
}

impl RequiredFields {
    /// Walks every place a field can be referenced.
    ///
    /// Sources: display keys, the group key and aggregation targets,
    /// identifiers inside dynamic-field and transform expressions, and both
    /// sides of every join pair. Dynamic field names are excluded since they
    /// are computed, as is the `value` identifier of transform expressions.
    pub fn collect(definition: &WidgetDefinition) -> Self {
        let mut fields = IndexSet::new();
        fields.extend(definition.display.data_keys().into_iter().map(str::to_string));

        let Some(data) = definition.data.as_ref() else {
            return Self { fields };
        };

        if let Some(group) = data.active_group() {
            fields.insert(group.key.trim().to_string());
            fields.extend(group.aggregations.keys().cloned());
        }

        for expression in data.dynamic_fields.values() {
            fields.extend(referenced_fields(expression));
        }

        for spec in data.transforms.values() {
            if let TransformSpec::Expression { expr } = spec {
                fields.extend(
                    referenced_fields(expr)
                        .into_iter()
                        .filter(|field| field != TRANSFORM_VALUE_IDENTIFIER),
                );
            }
        }

        for (left, right) in &data.join {
            fields.insert(left.trim().to_string());
            fields.insert(right.trim().to_string());
        }

        for dynamic_field in data.dynamic_fields.keys() {
            fields.shift_remove(dynamic_field);
        }
        fields.retain(|field| !field.is_empty());

        Self { fields }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields to request in single-source mode.
    ///
    /// An explicit `fields` list on the config comes first and the collected
    /// set is appended, so expression and aggregation inputs are never dropped.
    pub fn for_single_source(&self, config: &ProviderConfig) -> Vec<String> {
        let mut fields: IndexSet<String> = config.explicit_fields().unwrap_or_default().into_iter().collect();
        fields.extend(self.fields.iter().cloned());
        fields.into_iter().collect()
    }

    /// Fields to request from `source_key` in multi-source mode.
    ///
    /// The source's explicit `fields` list comes first. A field qualified with
    /// a known source key (`X.v`) then goes to that source only, unqualified
    /// (`v`), and unqualified fields go to every source. Join fields are
    /// qualified, so each source always receives its own.
    pub fn for_source(&self, source_key: &str, sources: &IndexMap<String, ProviderConfig>) -> Vec<String> {
        let mut routed: IndexSet<String> = sources
            .get(source_key)
            .and_then(ProviderConfig::explicit_fields)
            .unwrap_or_default()
            .into_iter()
            .collect();

        for field in &self.fields {
            match field.split_once('.') {
                Some((qualifier, rest)) if sources.contains_key(qualifier) => {
                    if qualifier == source_key && !rest.is_empty() {
                        routed.insert(rest.to_string());
                    }
                }
                _ => {
                    routed.insert(field.clone());
                }
            }
        }
        routed.into_iter().collect()
    }
}
