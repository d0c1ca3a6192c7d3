//! Shaping JSON documents into record sequences.

use serde_json::Value;

const RESPONSE_ARRAY_PRIORITY_KEYS: &[&str] = &["items", "results", "data", "records", "rows", "values", "entries", "list"];

/// Select a nested JSON value by a dot path with optional numeric indices.
///
/// Supports segments like `a`, `a.b`, `a.0.b`, and `a[0].b[1]`. Returns
/// `None` when any segment is missing or applied to the wrong JSON type. An
/// empty path (or `.`) returns the input unchanged.
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Some(value);
    }

    let mut current = value;
    for segment in trimmed.split('.') {
        if segment.is_empty() {
            continue;
        }
        let (key, indices) = split_indices(segment);
        if !key.is_empty() {
            current = match current {
                Value::Object(map) => map.get(key)?,
                Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        for index in indices {
            current = current.get(index)?;
        }
    }
    Some(current)
}

fn split_indices(segment: &str) -> (&str, Vec<usize>) {
    let Some(key_end) = segment.find('[') else {
        return (segment, Vec::new());
    };
    let key = &segment[..key_end];
    let indices = segment[key_end..]
        .split('[')
        .filter_map(|part| part.strip_suffix(']'))
        .filter_map(|part| part.trim().parse::<usize>().ok())
        .collect();
    (key, indices)
}

/// Turns a fetched document into an ordered record sequence.
///
/// Order of precedence:
/// 1. an explicit `path` selecting a nested value;
/// 2. a top-level array;
/// 3. a wrapper object's well-known array key, or its single array-valued field;
/// 4. any other object as a single record.
///
/// `null` yields no records.
pub fn extract_collection_items(payload: Value, path: Option<&str>) -> Vec<Value> {
    let payload = match path {
        Some(path) => select_path(&payload, path).cloned().unwrap_or(Value::Null),
        None => payload,
    };

    match payload {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(mut map) => {
            for key in RESPONSE_ARRAY_PRIORITY_KEYS {
                if matches!(map.get(*key), Some(Value::Array(_)))
                    && let Some(Value::Array(items)) = map.remove(*key)
                {
                    return items;
                }
            }

            let array_keys = map
                .iter()
                .filter(|(_, value)| value.is_array())
                .map(|(key, _)| key.clone())
                .collect::<Vec<_>>();
            if let [only_key] = array_keys.as_slice()
                && let Some(Value::Array(items)) = map.remove(only_key)
            {
                return items;
            }
            vec![Value::Object(map)]
        }
        scalar => vec![scalar],
    }
}
