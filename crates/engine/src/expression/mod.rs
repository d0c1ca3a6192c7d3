//! The sandboxed expression language used by dynamic fields and expression
//! transforms.
//!
//! Supported syntax: number, string, boolean and `null` literals; field
//! references (dotted names such as `token.symbol` refer to flattened keys);
//! arithmetic `+ - * / %` and unary `-`; comparisons `== != < <= > >=`;
//! logic `&& || !`; the conditional `cond ? a : b`; parentheses; and the
//! helper functions `abs round floor ceil sqrt pow min max log10 coalesce if
//! concat lower upper len number string`. Nothing else is callable.

mod eval;
mod functions;
mod lexer;
mod parser;

use serde_json::{Number, Value};
use thiserror::Error;

pub(crate) use eval::{as_number, display_string};

use functions::Function;
use lexer::{Token, tokenize};
use parser::{Node, parse};

/// Syntax error in an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("expression is empty")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedCharacter { offset: usize, found: char },
    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },
    #[error("invalid number '{text}' at offset {offset}")]
    InvalidNumber { offset: usize, text: String },
    #[error("unexpected token {found} at offset {offset}")]
    UnexpectedToken { offset: usize, found: String },
    #[error("unexpected end of expression at offset {offset}; expected {expected}")]
    UnexpectedEnd { offset: usize, expected: &'static str },
    #[error("unknown function '{name}' at offset {offset}")]
    UnknownFunction { offset: usize, name: String },
    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },
    #[error("expression is longer than {limit} tokens")]
    TooLong { limit: usize },
    #[error("function '{function}' takes {expected} argument(s), found {found}")]
    Arity {
        function: &'static str,
        expected: String,
        found: usize,
    },
}

/// A parsed expression, ready to evaluate against many rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let root = parse(tokenize(source)?, source.len())?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against a scope that resolves field names.
    ///
    /// Unknown fields evaluate to `null`.
    ///
    /// ```rust
    /// use quarry_engine::expression::Expression;
    /// use serde_json::json;
    ///
    /// let expression = Expression::parse("volume > 0 ? round(fees / volume * 100, 2) : null").expect("parse");
    /// let scope = |name: &str| match name {
    ///     "volume" => Some(json!(400)),
    ///     "fees" => Some(json!("3")),
    ///     _ => None,
    /// };
    /// assert_eq!(expression.evaluate(&scope), json!(0.75));
    /// ```
    pub fn evaluate<F>(&self, scope: &F) -> Value
    where
        F: Fn(&str) -> Option<Value>,
    {
        eval::evaluate(&self.root, scope)
    }

    /// Field names referenced by this expression, in first-seen order.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        collect_fields(&self.root, &mut fields);
        fields
    }
}

fn collect_fields(node: &Node, fields: &mut Vec<String>) {
    match node {
        Node::Literal(_) => {}
        Node::Field(name) => {
            if !fields.contains(name) {
                fields.push(name.clone());
            }
        }
        Node::Unary(_, operand) => collect_fields(operand, fields),
        Node::Binary(_, left, right) => {
            collect_fields(left, fields);
            collect_fields(right, fields);
        }
        Node::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_fields(condition, fields);
            collect_fields(then_branch, fields);
            collect_fields(else_branch, fields);
        }
        Node::Call(_, arguments) => {
            for argument in arguments {
                collect_fields(argument, fields);
            }
        }
    }
}

/// Identifiers an expression may read, even when it does not parse.
///
/// Falls back to a token scan so a malformed expression still contributes
/// its field names; identifiers immediately followed by `(` are treated as
/// function names.
pub fn referenced_fields(source: &str) -> Vec<String> {
    if let Ok(expression) = Expression::parse(source) {
        return expression.referenced_fields();
    }
    let Ok(tokens) = tokenize(source) else {
        return Vec::new();
    };
    let mut fields = Vec::new();
    for (index, spanned) in tokens.iter().enumerate() {
        let Token::Ident(name) = &spanned.token else {
            continue;
        };
        let is_call = matches!(tokens.get(index + 1).map(|next| &next.token), Some(Token::LParen))
            && Function::lookup(name).is_some();
        if !is_call && !fields.contains(name) {
            fields.push(name.clone());
        }
    }
    fields
}

/// Converts an `f64` to a JSON number, keeping integral values as integers.
///
/// Non-finite results become `null`.
pub(crate) fn number_value(number: f64) -> Value {
    if !number.is_finite() {
        return Value::Null;
    }
    if number.fract() == 0.0 && number.abs() < 9.0e15 {
        return Value::from(number as i64);
    }
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}
