//! Variable substitution for provider configurations.
//!
//! A configuration string of the form `$name` is a placeholder for the
//! caller-supplied variable `name`. Substitution replaces the whole string
//! with the variable's value, preserving its JSON type, so `"$limit"` can
//! become the number `10`. Placeholders without a bound variable stay as
//! literal strings, which lets partially-bound templates pass through.

use quarry_types::ProviderConfig;
use serde_json::{Map, Value};

/// Marks a configuration string as a variable placeholder.
pub const VARIABLE_SIGIL: char = '$';

/// Substitutes placeholders in a configuration tree using an injected lookup.
///
/// Mappings are walked recursively. Inside arrays only elements that are
/// themselves mappings are walked; bare strings in arrays stay literal.
/// Returns a new tree and never mutates the input.
///
/// # Examples
///
/// ```rust
/// use quarry_engine::variables::substitute_variables;
/// use serde_json::json;
///
/// let config = json!({ "first": "$limit", "filters": { "owner": "$owner" }, "tags": ["$limit"] });
/// let lookup = |name: &str| match name {
///     "limit" => Some(json!(10)),
///     "owner" => Some(json!("0xabc")),
///     _ => None,
/// };
///
/// let resolved = substitute_variables(&config, &lookup);
/// assert_eq!(resolved["first"], 10);
/// assert_eq!(resolved["filters"]["owner"], "0xabc");
/// assert_eq!(resolved["tags"][0], "$limit");
/// ```
pub fn substitute_variables<F>(value: &Value, lookup: &F) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    match value {
        Value::String(text) => substitute_placeholder(text, lookup).unwrap_or_else(|| value.clone()),
        Value::Object(map) => Value::Object(substitute_map(map, lookup)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(substitute_map(map, lookup)),
                    other => other.clone(),
                })
                .collect(),
        ),
        _ => value.clone(),
    }
}

fn substitute_map<F>(map: &Map<String, Value>, lookup: &F) -> Map<String, Value>
where
    F: Fn(&str) -> Option<Value>,
{
    map.iter()
        .map(|(key, value)| (key.clone(), substitute_variables(value, lookup)))
        .collect()
}

fn substitute_placeholder<F>(text: &str, lookup: &F) -> Option<Value>
where
    F: Fn(&str) -> Option<Value>,
{
    let name = text.strip_prefix(VARIABLE_SIGIL)?;
    if name.is_empty() {
        return None;
    }
    lookup(name)
}

/// Substitutes placeholders from a JSON variable bag.
pub fn apply_variables(value: &Value, variables: &Map<String, Value>) -> Value {
    substitute_variables(value, &|name: &str| variables.get(name).cloned())
}

/// Returns a copy of `config` with every placeholder bound from `variables`.
pub fn apply_variables_to_config(config: &ProviderConfig, variables: &Map<String, Value>) -> ProviderConfig {
    let lookup = |name: &str| variables.get(name).cloned();
    ProviderConfig::new(substitute_map(config.as_map(), &lookup))
}
