//! Flattening provider records into rows.

use quarry_types::Row;
use serde_json::Value;

use crate::transform::TransformSet;

/// Key used when a record is not an object.
pub const SCALAR_RECORD_KEY: &str = "value";

/// Normalizes one provider record into a flat row.
///
/// Nested objects become dotted keys and arrays flatten by index
/// (`items.0.id`). Transforms run on the unprefixed keys, then `prefix`
/// (when set) is prepended to every key. Rows keep unqualified keys.
///
/// ```rust
/// use quarry_engine::normalize::normalize_record;
/// use quarry_engine::transform::TransformSet;
/// use serde_json::json;
///
/// let row = normalize_record(
///     json!({ "id": "0x1", "token": { "symbol": "ETH" }, "ticks": [1, 2] }),
///     &TransformSet::default(),
///     None,
///     None,
/// );
/// let keys = row.keys().map(String::as_str).collect::<Vec<_>>();
/// assert_eq!(keys, vec!["id", "token.symbol", "ticks.0", "ticks.1"]);
/// ```
pub fn normalize_record(record: Value, transforms: &TransformSet, source_key: Option<&str>, prefix: Option<&str>) -> Row {
    let mut row = Row::new();
    match record {
        Value::Object(map) => {
            for (key, value) in map {
                flatten_into(&mut row, key, value);
            }
        }
        scalar => {
            row.insert(SCALAR_RECORD_KEY.to_string(), scalar);
        }
    }

    if !transforms.is_empty() {
        transforms.apply(&mut row, source_key);
    }

    match prefix.map(str::trim).filter(|prefix| !prefix.is_empty()) {
        Some(prefix) => row
            .into_iter()
            .map(|(key, value)| (format!("{prefix}{key}"), value))
            .collect(),
        None => row,
    }
}

fn flatten_into(row: &mut Row, path: String, value: Value) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, nested) in map {
                flatten_into(row, format!("{path}.{key}"), nested);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, nested) in items.into_iter().enumerate() {
                flatten_into(row, format!("{path}.{index}"), nested);
            }
        }
        leaf => {
            row.insert(path, leaf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use quarry_types::TransformSpec;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects_and_arrays() {
        let row = normalize_record(
            json!({ "pool": { "token0": { "symbol": "A" } }, "items": [{ "id": 1 }, { "id": 2 }], "tags": [], "meta": {} }),
            &TransformSet::default(),
            None,
            None,
        );
        assert_eq!(row["pool.token0.symbol"], json!("A"));
        assert_eq!(row["items.0.id"], json!(1));
        assert_eq!(row["items.1.id"], json!(2));
        assert_eq!(row["tags"], json!([]));
        assert_eq!(row["meta"], json!({}));
    }

    #[test]
    fn scalar_records_become_value_rows() {
        let row = normalize_record(json!(42), &TransformSet::default(), None, None);
        assert_eq!(row.len(), 1);
        assert_eq!(row[SCALAR_RECORD_KEY], json!(42));
    }

    #[test]
    fn prefix_applies_after_transforms() {
        let specs: IndexMap<String, TransformSpec> =
            serde_json::from_value(json!({ "price": "number" })).expect("transforms");
        let row = normalize_record(
            json!({ "price": "1.5", "id": "a" }),
            &TransformSet::compile(&specs),
            Some("Y"),
            Some("y_"),
        );
        let keys = row.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys, vec!["y_price", "y_id"]);
        assert_eq!(row["y_price"], json!(1.5));
    }
}
