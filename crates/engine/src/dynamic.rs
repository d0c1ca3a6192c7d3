//! Computed fields attached to every row after joining and grouping.

use indexmap::IndexMap;
use quarry_types::ResultSet;
use serde_json::Value;
use tracing::warn;

use crate::expression::Expression;

/// Evaluates each dynamic field in declaration order and stores the result
/// on the row, so later fields may read earlier ones.
///
/// An expression that fails to parse is reported once and yields `null` on
/// every row.
///
/// ```rust
/// use indexmap::IndexMap;
/// use quarry_engine::dynamic::apply_dynamic_fields;
/// use serde_json::json;
///
/// let mut row = IndexMap::new();
/// row.insert("fees".to_string(), json!(3));
/// row.insert("volume".to_string(), json!(400));
///
/// let mut fields = IndexMap::new();
/// fields.insert("feeRate".to_string(), "fees / volume".to_string());
/// fields.insert("feePercent".to_string(), "feeRate * 100".to_string());
///
/// let rows = apply_dynamic_fields(vec![row], &fields);
/// assert_eq!(rows[0]["feePercent"], json!(0.75));
/// ```
pub fn apply_dynamic_fields(mut rows: ResultSet, dynamic_fields: &IndexMap<String, String>) -> ResultSet {
    if dynamic_fields.is_empty() {
        return rows;
    }

    let compiled = dynamic_fields
        .iter()
        .map(|(field, source)| {
            let expression = Expression::parse(source)
                .map_err(|error| {
                    warn!(field = %field, expression = %source, error = %error, "dynamic field failed to parse; evaluating to null");
                })
                .ok();
            (field.as_str(), expression)
        })
        .collect::<Vec<_>>();

    for row in &mut rows {
        for (field, expression) in &compiled {
            let value = match expression {
                Some(expression) => expression.evaluate(&|name: &str| row.get(name).cloned()),
                None => Value::Null,
            };
            row.insert((*field).to_string(), value);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::Row;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).expect("row")
    }

    fn fields(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(name, expr)| (name.to_string(), expr.to_string())).collect()
    }

    #[test]
    fn undefined_fields_propagate_null() {
        let rows = apply_dynamic_fields(
            vec![row(json!({ "fees": 10 }))],
            &fields(&[("ratio", "fees / volume"), ("label", "concat('fees: ', fees)")]),
        );
        assert_eq!(rows[0]["ratio"], Value::Null);
        assert_eq!(rows[0]["label"], json!("fees: 10"));
    }

    #[test]
    fn malformed_expression_is_null_for_every_row() {
        let rows = apply_dynamic_fields(
            vec![row(json!({ "a": 1 })), row(json!({ "a": 2 }))],
            &fields(&[("broken", "a +* 2"), ("double", "a * 2")]),
        );
        assert_eq!(rows[0]["broken"], Value::Null);
        assert_eq!(rows[1]["broken"], Value::Null);
        assert_eq!(rows[1]["double"], json!(4));
    }

    #[test]
    fn deeply_nested_expression_is_null() {
        let nested = format!("{}fees{}", "(".repeat(5_000), ")".repeat(5_000));
        let rows = apply_dynamic_fields(vec![row(json!({ "fees": 1 }))], &fields(&[("deep", nested.as_str())]));
        assert_eq!(rows[0]["deep"], Value::Null);
        assert_eq!(rows[0]["fees"], json!(1));
    }

    #[test]
    fn dynamic_field_may_overwrite_fetched_value() {
        let rows = apply_dynamic_fields(vec![row(json!({ "price": "2.5" }))], &fields(&[("price", "number(price) * 2")]));
        assert_eq!(rows[0]["price"], json!(5));
    }
}
