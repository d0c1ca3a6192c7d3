//! Whitelisted helper functions callable from expressions.

use serde_json::Value;

use super::ExpressionError;
use super::eval::{as_number, display_string, is_truthy};
use super::number_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Abs,
    Round,
    Floor,
    Ceil,
    Sqrt,
    Pow,
    Min,
    Max,
    Log10,
    Coalesce,
    If,
    Concat,
    Lower,
    Upper,
    Len,
    Number,
    String,
}

impl Function {
    pub(crate) fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Self::Abs,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "sqrt" => Self::Sqrt,
            "pow" => Self::Pow,
            "min" => Self::Min,
            "max" => Self::Max,
            "log10" => Self::Log10,
            "coalesce" => Self::Coalesce,
            "if" => Self::If,
            "concat" => Self::Concat,
            "lower" => Self::Lower,
            "upper" => Self::Upper,
            "len" => Self::Len,
            "number" => Self::Number,
            "string" => Self::String,
            _ => return None,
        })
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Sqrt => "sqrt",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
            Self::Log10 => "log10",
            Self::Coalesce => "coalesce",
            Self::If => "if",
            Self::Concat => "concat",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Len => "len",
            Self::Number => "number",
            Self::String => "string",
        }
    }

    /// Inclusive argument count bounds; `None` means unbounded.
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Abs | Self::Floor | Self::Ceil | Self::Sqrt | Self::Log10 => (1, Some(1)),
            Self::Lower | Self::Upper | Self::Len | Self::Number | Self::String => (1, Some(1)),
            Self::Round => (1, Some(2)),
            Self::Pow => (2, Some(2)),
            Self::If => (3, Some(3)),
            Self::Min | Self::Max | Self::Coalesce => (1, None),
            Self::Concat => (0, None),
        }
    }

    pub(crate) fn check_arity(self, count: usize) -> Result<(), ExpressionError> {
        let (min, max) = self.arity();
        if count < min || max.is_some_and(|max| count > max) {
            return Err(ExpressionError::Arity {
                function: self.name(),
                expected: match max {
                    Some(max) if max == min => format!("{min}"),
                    Some(max) => format!("{min} to {max}"),
                    None => format!("at least {min}"),
                },
                found: count,
            });
        }
        Ok(())
    }

    /// Applies the function to already-evaluated arguments.
    ///
    /// `if` is evaluated lazily by the evaluator and only reaches here when
    /// called through [`Function::apply`] directly.
    pub(crate) fn apply(self, arguments: &[Value]) -> Value {
        let first = arguments.first().unwrap_or(&Value::Null);
        match self {
            Self::Abs => unary_math(first, f64::abs),
            Self::Floor => unary_math(first, f64::floor),
            Self::Ceil => unary_math(first, f64::ceil),
            Self::Sqrt => unary_math(first, f64::sqrt),
            Self::Log10 => unary_math(first, f64::log10),
            Self::Round => {
                let digits = arguments.get(1).and_then(as_number).unwrap_or(0.0);
                match as_number(first) {
                    Some(number) => number_value(round_to(number, digits)),
                    None => Value::Null,
                }
            }
            Self::Pow => match (as_number(first), arguments.get(1).and_then(as_number)) {
                (Some(base), Some(exponent)) => number_value(base.powf(exponent)),
                _ => Value::Null,
            },
            Self::Min => fold_numbers(arguments, f64::min),
            Self::Max => fold_numbers(arguments, f64::max),
            Self::Coalesce => arguments
                .iter()
                .find(|value| !value.is_null())
                .cloned()
                .unwrap_or(Value::Null),
            Self::If => {
                if is_truthy(first) {
                    arguments.get(1).cloned().unwrap_or(Value::Null)
                } else {
                    arguments.get(2).cloned().unwrap_or(Value::Null)
                }
            }
            Self::Concat => Value::String(
                arguments
                    .iter()
                    .filter(|value| !value.is_null())
                    .map(display_string)
                    .collect(),
            ),
            Self::Lower => map_text(first, |text| text.to_lowercase()),
            Self::Upper => map_text(first, |text| text.to_uppercase()),
            Self::Len => match first {
                Value::String(text) => Value::from(text.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
                _ => Value::Null,
            },
            Self::Number => as_number(first).map(number_value).unwrap_or(Value::Null),
            Self::String => match first {
                Value::Null => Value::Null,
                other => Value::String(display_string(other)),
            },
        }
    }
}

fn round_to(number: f64, digits: f64) -> f64 {
    let digits = digits.clamp(0.0, 15.0).trunc() as i32;
    let factor = 10f64.powi(digits);
    (number * factor).round() / factor
}

fn unary_math(value: &Value, operation: fn(f64) -> f64) -> Value {
    match as_number(value) {
        Some(number) => number_value(operation(number)),
        None => Value::Null,
    }
}

fn fold_numbers(arguments: &[Value], operation: fn(f64, f64) -> f64) -> Value {
    arguments
        .iter()
        .filter_map(as_number)
        .reduce(operation)
        .map(number_value)
        .unwrap_or(Value::Null)
}

fn map_text(value: &Value, operation: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(text) => Value::String(operation(text)),
        other => Value::String(operation(&display_string(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_helpers_coerce_numeric_strings() {
        assert_eq!(Function::Abs.apply(&[json!("-3")]), json!(3));
        assert_eq!(Function::Round.apply(&[json!(2.456), json!(2)]), json!(2.46));
        assert_eq!(Function::Pow.apply(&[json!(2), json!(10)]), json!(1024));
        assert_eq!(Function::Sqrt.apply(&[json!(-1)]), Value::Null);
        assert_eq!(Function::Floor.apply(&[json!("n/a")]), Value::Null);
    }

    #[test]
    fn min_max_skip_non_numeric_arguments() {
        assert_eq!(Function::Max.apply(&[json!(1), Value::Null, json!("7"), json!("x")]), json!(7));
        assert_eq!(Function::Min.apply(&[Value::Null]), Value::Null);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(Function::Concat.apply(&[json!("a"), json!(1), Value::Null, json!(true)]), json!("a1true"));
        assert_eq!(Function::Upper.apply(&[json!("eth")]), json!("ETH"));
        assert_eq!(Function::Len.apply(&[json!("héllo")]), json!(5));
        assert_eq!(Function::Coalesce.apply(&[Value::Null, json!(0), json!(1)]), json!(0));
        assert_eq!(Function::String.apply(&[json!(1.5)]), json!("1.5"));
    }
}
