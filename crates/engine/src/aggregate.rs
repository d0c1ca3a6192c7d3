//! Grouping rows by a key field and reducing each partition to one row.

use std::collections::HashSet;

use indexmap::IndexMap;
use quarry_types::{AggregateFunction, GroupSpec, ResultSet, Row};
use serde_json::Value;

use crate::expression::{as_number, number_value};

/// Groups `rows` by `group.key`, keeping first-seen partition order.
///
/// Partitioning uses the raw key value without coercion; rows missing the key
/// land in the `null` partition. Each output row holds the key and one field
/// per aggregation; other fields are dropped.
pub fn group_rows(rows: ResultSet, group: &GroupSpec) -> ResultSet {
    let key_field = group.key.trim();
    let mut partitions: Vec<(Value, Vec<Row>)> = Vec::new();
    let mut positions: IndexMap<String, usize> = IndexMap::new();

    for row in rows {
        let key_value = row.get(key_field).cloned().unwrap_or(Value::Null);
        let identity = partition_identity(&key_value);
        match positions.get(&identity) {
            Some(position) => partitions[*position].1.push(row),
            None => {
                positions.insert(identity, partitions.len());
                partitions.push((key_value, vec![row]));
            }
        }
    }

    partitions
        .into_iter()
        .map(|(key_value, members)| {
            let mut output = Row::new();
            output.insert(key_field.to_string(), key_value);
            for (field, function) in &group.aggregations {
                if field == key_field {
                    continue;
                }
                let values = members.iter().map(|row| row.get(field).unwrap_or(&Value::Null));
                output.insert(field.clone(), aggregate(*function, values));
            }
            output
        })
        .collect()
}

/// Distinguishes `1` from `"1"` while treating `1` and `1.0` alike.
///
/// Also used for `countDistinct`.
fn partition_identity(value: &Value) -> String {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(float) => format!("n:{float}"),
            None => format!("n:{number}"),
        },
        other => format!("v:{other}"),
    }
}

/// Reduces the values of one field within a partition.
pub fn aggregate<'a, I>(function: AggregateFunction, mut values: I) -> Value
where
    I: Iterator<Item = &'a Value>,
{
    match function {
        AggregateFunction::Sum => number_value(numeric_values(values).sum::<f64>()),
        AggregateFunction::Avg => {
            let (total, count) = numeric_values(values).fold((0.0, 0usize), |(total, count), number| (total + number, count + 1));
            if count == 0 {
                Value::Null
            } else {
                number_value(total / count as f64)
            }
        }
        AggregateFunction::Min => numeric_values(values).reduce(f64::min).map(number_value).unwrap_or(Value::Null),
        AggregateFunction::Max => numeric_values(values).reduce(f64::max).map(number_value).unwrap_or(Value::Null),
        AggregateFunction::Count => Value::from(values.filter(|value| !value.is_null()).count()),
        AggregateFunction::CountDistinct => {
            let distinct = values
                .filter(|value| !value.is_null())
                .map(partition_identity)
                .collect::<HashSet<_>>();
            Value::from(distinct.len())
        }
        AggregateFunction::First => values.find(|value| !value.is_null()).cloned().unwrap_or(Value::Null),
        AggregateFunction::Last => values.filter(|value| !value.is_null()).last().cloned().unwrap_or(Value::Null),
    }
}

fn numeric_values<'a, I>(values: I) -> impl Iterator<Item = f64>
where
    I: Iterator<Item = &'a Value>,
{
    values.filter_map(as_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: Value) -> ResultSet {
        serde_json::from_value(value).expect("rows")
    }

    fn group(value: Value) -> GroupSpec {
        serde_json::from_value(value).expect("group")
    }

    #[test]
    fn sums_per_category_in_first_seen_order() {
        let result = group_rows(
            rows(json!([
                { "category": "a", "amount": 1, "note": "x" },
                { "category": "b", "amount": 5 },
                { "category": "a", "amount": 2 }
            ])),
            &group(json!({ "key": "category", "aggregations": { "amount": "sum" } })),
        );
        assert_eq!(
            result,
            rows(json!([{ "category": "a", "amount": 3 }, { "category": "b", "amount": 5 }]))
        );
    }

    #[test]
    fn key_whitespace_is_ignored() {
        let result = group_rows(
            rows(json!([{ "category": "a", "amount": 1 }, { "category": "a", "amount": 2 }])),
            &group(json!({ "key": " category ", "aggregations": { "amount": "sum" } })),
        );
        assert_eq!(result, rows(json!([{ "category": "a", "amount": 3 }])));
    }

    #[test]
    fn raw_key_values_are_not_coerced() {
        let result = group_rows(
            rows(json!([{ "k": 1, "n": 1 }, { "k": "1", "n": 1 }, { "n": 1 }, { "k": 1.0, "n": 1 }])),
            &group(json!({ "key": "k", "aggregations": { "n": "count" } })),
        );
        assert_eq!(
            result,
            rows(json!([{ "k": 1, "n": 2 }, { "k": "1", "n": 1 }, { "k": null, "n": 1 }]))
        );
    }

    #[test]
    fn numeric_aggregations_use_numbers_and_numeric_strings() {
        let values = [json!(2), json!("4"), json!("n/a"), Value::Null, json!(true)];
        assert_eq!(aggregate(AggregateFunction::Sum, values.iter()), json!(6));
        assert_eq!(aggregate(AggregateFunction::Avg, values.iter()), json!(3));
        assert_eq!(aggregate(AggregateFunction::Min, values.iter()), json!(2));
        assert_eq!(aggregate(AggregateFunction::Max, values.iter()), json!(4));
        assert_eq!(aggregate(AggregateFunction::Count, values.iter()), json!(4));
        assert_eq!(aggregate(AggregateFunction::First, values.iter()), json!(2));
        assert_eq!(aggregate(AggregateFunction::Last, values.iter()), json!(true));
    }

    #[test]
    fn empty_inputs() {
        let values = [Value::Null, json!("x")];
        assert_eq!(aggregate(AggregateFunction::Sum, values.iter()), json!(0));
        assert_eq!(aggregate(AggregateFunction::Avg, values.iter()), Value::Null);
        assert_eq!(aggregate(AggregateFunction::Min, values.iter()), Value::Null);
    }

    #[test]
    fn count_distinct_treats_equal_numbers_alike() {
        let values = [json!(1), json!(1.0), json!("1"), json!("a"), json!("a"), Value::Null];
        assert_eq!(aggregate(AggregateFunction::CountDistinct, values.iter()), json!(3));
    }

    #[test]
    fn sum_is_order_insensitive() {
        let forward = [json!(1.5), json!(2), json!("3.5")];
        let backward = [json!("3.5"), json!(2), json!(1.5)];
        assert_eq!(
            aggregate(AggregateFunction::Sum, forward.iter()),
            aggregate(AggregateFunction::Sum, backward.iter())
        );
    }
}
