//! Data section of a widget definition: sources, joins, grouping, transforms,
//! and dynamic fields, plus the flat row shape produced by resolution.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// A single flat result record keyed by (possibly dotted) field name.
pub type Row = IndexMap<String, Value>;

/// Ordered rows handed to the presentation layer.
pub type ResultSet = Vec<Row>;

/// Declares where widget data comes from and how it is reshaped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSpec {
    /// Single-source configuration. Takes precedence over `sources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ProviderConfig>,
    /// Multi-source configuration keyed by source key, in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<IndexMap<String, ProviderConfig>>,
    /// Join equivalences between qualified fields (`sourceKey.field`).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub join: IndexMap<String, String>,
    /// Optional grouping and aggregation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupSpec>,
    /// Per-field value transforms applied during normalization.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub transforms: IndexMap<String, TransformSpec>,
    /// Derived fields computed from expressions, evaluated in declaration order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub dynamic_fields: IndexMap<String, String>,
}

/// Which sourcing mode a [`DataSpec`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceMode<'a> {
    Single(&'a ProviderConfig),
    Multi(&'a IndexMap<String, ProviderConfig>),
}

impl DataSpec {
    /// Returns the effective sourcing mode, or `None` when neither `source`
    /// nor `sources` is configured.
    ///
    /// When both are present `source` wins.
    pub fn mode(&self) -> Option<SourceMode<'_>> {
        if let Some(source) = self.source.as_ref() {
            return Some(SourceMode::Single(source));
        }
        self.sources.as_ref().map(SourceMode::Multi)
    }

    /// Returns the grouping spec only when a non-empty key is configured.
    pub fn active_group(&self) -> Option<&GroupSpec> {
        self.group.as_ref().filter(|group| !group.key.trim().is_empty())
    }
}

/// Adapter-specific provider configuration.
///
/// The core only reads a few reserved keys (`provider`, `fields`, `prefix`);
/// everything else is passed through to the adapter after variable
/// substitution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ProviderConfig(JsonMap<String, Value>);

impl ProviderConfig {
    /// Key naming the adapter kind (`graph`, `ipfs`, `ipns`, `http`).
    pub const PROVIDER_KEY: &'static str = "provider";
    /// Optional explicit list of fields to request from this source.
    pub const FIELDS_KEY: &'static str = "fields";
    /// Optional prefix applied to every normalized key of this source.
    pub const PREFIX_KEY: &'static str = "prefix";

    pub fn new(map: JsonMap<String, Value>) -> Self {
        Self(map)
    }

    /// Builds a config from a JSON value, returning `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &JsonMap<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> JsonMap<String, Value> {
        self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a trimmed, non-empty string value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Adapter kind, lowercased.
    pub fn kind(&self) -> Option<String> {
        self.get_str(Self::PROVIDER_KEY).map(str::to_ascii_lowercase)
    }

    /// Explicit field list for this source, when configured as an array of strings.
    pub fn explicit_fields(&self) -> Option<Vec<String>> {
        let Value::Array(items) = self.0.get(Self::FIELDS_KEY)? else {
            return None;
        };
        Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Key prefix applied by the row normalizer.
    pub fn prefix(&self) -> Option<&str> {
        self.get_str(Self::PREFIX_KEY)
    }
}

impl From<JsonMap<String, Value>> for ProviderConfig {
    fn from(map: JsonMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Grouping key plus per-field aggregation functions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GroupSpec {
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub aggregations: IndexMap<String, AggregateFunction>,
}

/// Reduction applied to a field within a group partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AggregateFunction {
    Sum,
    #[serde(alias = "average")]
    Avg,
    Min,
    Max,
    Count,
    CountDistinct,
    First,
    Last,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
            Self::CountDistinct => "countDistinct",
            Self::First => "first",
            Self::Last => "last",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an aggregation name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAggregateFunction(pub String);

impl fmt::Display for UnknownAggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown aggregation '{}'; expected one of sum, avg, min, max, count, countDistinct, first, last",
            self.0
        )
    }
}

impl std::error::Error for UnknownAggregateFunction {}

impl FromStr for AggregateFunction {
    type Err = UnknownAggregateFunction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sum" => Ok(Self::Sum),
            "avg" | "average" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            "countDistinct" => Ok(Self::CountDistinct),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(UnknownAggregateFunction(other.to_string())),
        }
    }
}

/// Transform applied to a single field during row normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TransformSpec {
    /// Built-in transform referenced by name.
    Named(NamedTransform),
    /// Expression evaluated with the current field value bound to `value`.
    Expression { expr: String },
}

/// Built-in value transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum NamedTransform {
    Number,
    String,
    Abs,
    Round,
    Floor,
    Ceil,
    Percent,
    WeiToEther,
    GweiToEther,
    TimestampToDate,
    TimestampToDateTime,
    Lowercase,
    Uppercase,
}
