//! Per-field value transforms applied while normalizing provider records.

use chrono::{DateTime, SecondsFormat};
use indexmap::IndexMap;
use quarry_types::{NamedTransform, Row, TransformSpec};
use serde_json::Value;
use tracing::warn;

use crate::expression::{Expression, as_number, display_string, number_value};

const WEI_PER_ETHER: f64 = 1e18;
const GWEI_PER_ETHER: f64 = 1e9;

#[derive(Debug, Clone)]
enum CompiledTransform {
    Named(NamedTransform),
    Expression(Expression),
    /// The expression failed to parse; the field is left untouched.
    Invalid,
}

/// Transforms compiled once per resolution.
///
/// Keys are either plain field names or `sourceKey.field`; a qualified key
/// takes precedence over the plain key for records of that source.
#[derive(Debug, Clone, Default)]
pub struct TransformSet {
    transforms: IndexMap<String, CompiledTransform>,
}

impl TransformSet {
    pub fn compile(specs: &IndexMap<String, TransformSpec>) -> Self {
        let transforms = specs
            .iter()
            .map(|(field, spec)| {
                let compiled = match spec {
                    TransformSpec::Named(named) => CompiledTransform::Named(*named),
                    TransformSpec::Expression { expr } => match Expression::parse(expr) {
                        Ok(expression) => CompiledTransform::Expression(expression),
                        Err(error) => {
                            warn!(field = %field, expression = %expr, error = %error, "transform expression failed to parse; values left unchanged");
                            CompiledTransform::Invalid
                        }
                    },
                };
                (field.clone(), compiled)
            })
            .collect();
        Self { transforms }
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    /// Applies every transform whose field is present in `row`.
    ///
    /// `row` holds the record's flattened, unprefixed keys. Fields missing from
    /// the row are skipped.
    pub fn apply(&self, row: &mut Row, source_key: Option<&str>) {
        for (key, transform) in &self.transforms {
            let field = match (source_key, key.split_once('.')) {
                (Some(source), Some((qualifier, field))) if qualifier == source => field,
                (Some(source), _) => {
                    let qualified = format!("{source}.{key}");
                    if !row.contains_key(key.as_str()) || self.transforms.contains_key(&qualified) {
                        continue;
                    }
                    key.as_str()
                }
                (None, _) => key.as_str(),
            };
            let Some(current) = row.get(field) else {
                continue;
            };
            let transformed = match transform {
                CompiledTransform::Named(named) => apply_named(*named, current),
                CompiledTransform::Expression(expression) => expression.evaluate(&|name: &str| {
                    if name == "value" {
                        Some(current.clone())
                    } else {
                        row.get(name).cloned()
                    }
                }),
                CompiledTransform::Invalid => continue,
            };
            row.insert(field.to_string(), transformed);
        }
    }
}

/// Applies a built-in transform; values it cannot handle are returned unchanged.
pub fn apply_named(transform: NamedTransform, value: &Value) -> Value {
    let numeric = |operation: fn(f64) -> f64| match as_number(value) {
        Some(number) => number_value(operation(number)),
        None => value.clone(),
    };
    match transform {
        NamedTransform::Number => numeric(|number| number),
        NamedTransform::String => match value {
            Value::Null => Value::Null,
            other => Value::String(display_string(other)),
        },
        NamedTransform::Abs => numeric(f64::abs),
        NamedTransform::Round => numeric(f64::round),
        NamedTransform::Floor => numeric(f64::floor),
        NamedTransform::Ceil => numeric(f64::ceil),
        NamedTransform::Percent => numeric(|number| number * 100.0),
        NamedTransform::WeiToEther => numeric(|number| number / WEI_PER_ETHER),
        NamedTransform::GweiToEther => numeric(|number| number / GWEI_PER_ETHER),
        NamedTransform::TimestampToDate => format_timestamp(value, |date| date.format("%Y-%m-%d").to_string()),
        NamedTransform::TimestampToDateTime => {
            format_timestamp(value, |date| date.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        NamedTransform::Lowercase => match value {
            Value::String(text) => Value::String(text.to_lowercase()),
            other => other.clone(),
        },
        NamedTransform::Uppercase => match value {
            Value::String(text) => Value::String(text.to_uppercase()),
            other => other.clone(),
        },
    }
}

fn format_timestamp(value: &Value, render: impl Fn(DateTime<chrono::Utc>) -> String) -> Value {
    let Some(seconds) = as_number(value) else {
        return value.clone();
    };
    match DateTime::from_timestamp(seconds.trunc() as i64, 0) {
        Some(date) => Value::String(render(date)),
        None => value.clone(),
    }
}
