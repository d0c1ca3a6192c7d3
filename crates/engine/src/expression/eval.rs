//! Tree-walking evaluator and value coercions.
//!
//! `null` is the empty sentinel: it propagates through arithmetic and
//! ordering comparisons, and division by zero produces it.

use std::cmp::Ordering;

use serde_json::Value;

use super::functions::Function;
use super::number_value;
use super::parser::{BinaryOp, Node, UnaryOp};

pub(crate) fn evaluate<F>(node: &Node, scope: &F) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    match node {
        Node::Literal(value) => value.clone(),
        Node::Field(name) => scope(name).unwrap_or(Value::Null),
        Node::Unary(UnaryOp::Negate, operand) => match as_number(&evaluate(operand, scope)) {
            Some(number) => number_value(-number),
            None => Value::Null,
        },
        Node::Unary(UnaryOp::Not, operand) => Value::Bool(!is_truthy(&evaluate(operand, scope))),
        Node::Binary(BinaryOp::And, left, right) => {
            let left = evaluate(left, scope);
            if is_truthy(&left) { evaluate(right, scope) } else { left }
        }
        Node::Binary(BinaryOp::Or, left, right) => {
            let left = evaluate(left, scope);
            if is_truthy(&left) { left } else { evaluate(right, scope) }
        }
        Node::Binary(op, left, right) => binary(*op, &evaluate(left, scope), &evaluate(right, scope)),
        Node::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if is_truthy(&evaluate(condition, scope)) {
                evaluate(then_branch, scope)
            } else {
                evaluate(else_branch, scope)
            }
        }
        Node::Call(Function::If, arguments) => {
            let [condition, then_branch, else_branch] = arguments.as_slice() else {
                return Value::Null;
            };
            if is_truthy(&evaluate(condition, scope)) {
                evaluate(then_branch, scope)
            } else {
                evaluate(else_branch, scope)
            }
        }
        Node::Call(function, arguments) => {
            let values = arguments.iter().map(|argument| evaluate(argument, scope)).collect::<Vec<_>>();
            function.apply(&values)
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Equal => Value::Bool(loosely_equal(left, right)),
        BinaryOp::NotEqual => Value::Bool(!loosely_equal(left, right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let Some(ordering) = compare(left, right) else {
                return Value::Null;
            };
            Value::Bool(match op {
                BinaryOp::Less => ordering == Ordering::Less,
                BinaryOp::LessEqual => ordering != Ordering::Greater,
                BinaryOp::Greater => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        _ if left.is_null() || right.is_null() => Value::Null,
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Value::String(format!("{}{}", display_string(left), display_string(right)))
        }
        _ => {
            let (Some(left), Some(right)) = (as_number(left), as_number(right)) else {
                return Value::Null;
            };
            match op {
                BinaryOp::Add => number_value(left + right),
                BinaryOp::Subtract => number_value(left - right),
                BinaryOp::Multiply => number_value(left * right),
                BinaryOp::Divide if right == 0.0 => Value::Null,
                BinaryOp::Divide => number_value(left / right),
                BinaryOp::Remainder if right == 0.0 => Value::Null,
                BinaryOp::Remainder => number_value(left % right),
                _ => Value::Null,
            }
        }
    }
}

/// Numbers and numeric strings compare by value; everything else structurally.
pub(crate) fn loosely_equal(left: &Value, right: &Value) -> bool {
    if let (Some(left_number), Some(right_number)) = (as_number(left), as_number(right))
        && !(left.is_string() && right.is_string())
    {
        return left_number == right_number;
    }
    left == right
}

/// Orders two values when both are numeric or both are strings.
pub(crate) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(left), Value::String(right)) => Some(left.cmp(right)),
        _ => as_number(left)?.partial_cmp(&as_number(right)?),
    }
}

/// Coerces numbers and numeric strings to `f64`.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|number| number.is_finite())
        }
        _ => None,
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|number| number != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Renders a value the way string concatenation sees it.
pub(crate) fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
