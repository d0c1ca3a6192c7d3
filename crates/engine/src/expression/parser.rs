//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, lowest first: conditional `?:`, `||`, `&&`, equality,
//! comparison, additive, multiplicative, unary, primary.

use serde_json::Value;

use super::ExpressionError;
use super::functions::Function;
use super::lexer::{Spanned, Token};

/// Deepest nesting of parentheses, calls, conditionals and unary operators.
pub(crate) const MAX_NESTING_DEPTH: usize = 64;
/// Longest accepted expression, in tokens. Bounds left-leaning operator chains.
pub(crate) const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(Value),
    Field(String),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Conditional {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
    },
    Call(Function, Vec<Node>),
}

pub(crate) fn parse(tokens: Vec<Spanned>, source_len: usize) -> Result<Node, ExpressionError> {
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    if tokens.len() > MAX_TOKENS {
        return Err(ExpressionError::TooLong { limit: MAX_TOKENS });
    }
    let mut parser = Parser {
        tokens,
        position: 0,
        source_len,
        depth: 0,
    };
    let node = parser.conditional()?;
    if let Some(spanned) = parser.tokens.get(parser.position) {
        return Err(ExpressionError::UnexpectedToken {
            offset: spanned.offset,
            found: format!("{:?}", spanned.token),
        });
    }
    Ok(node)
}

struct Parser {
    tokens: Vec<Spanned>,
    position: usize,
    source_len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.position).cloned();
        if spanned.is_some() {
            self.position += 1;
        }
        spanned
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, description: &'static str) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            return Ok(());
        }
        Err(match self.tokens.get(self.position) {
            Some(spanned) => ExpressionError::UnexpectedToken {
                offset: spanned.offset,
                found: format!("{:?} (expected {description})", spanned.token),
            },
            None => ExpressionError::UnexpectedEnd {
                offset: self.source_len,
                expected: description,
            },
        })
    }

    /// Runs `rule` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn nested<T>(
        &mut self,
        rule: impl FnOnce(&mut Self) -> Result<T, ExpressionError>,
    ) -> Result<T, ExpressionError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ExpressionError::TooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;
        result
    }

    fn conditional(&mut self) -> Result<Node, ExpressionError> {
        self.nested(Self::conditional_inner)
    }

    fn conditional_inner(&mut self) -> Result<Node, ExpressionError> {
        let condition = self.logical_or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then_branch = self.conditional()?;
        self.expect(Token::Colon, "':' in conditional")?;
        let else_branch = self.conditional()?;
        Ok(Node::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn logical_or(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.logical_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.logical_and()?;
            left = Node::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.equality()?;
            left = Node::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Equal,
                Some(Token::NotEq) => BinaryOp::NotEqual,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.comparison()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn comparison(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Less,
                Some(Token::LtEq) => BinaryOp::LessEqual,
                Some(Token::Gt) => BinaryOp::Greater,
                Some(Token::GtEq) => BinaryOp::GreaterEqual,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.additive()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn additive(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.multiplicative()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Node, ExpressionError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Remainder,
                _ => return Ok(left),
            };
            self.position += 1;
            let right = self.unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        if self.eat(&Token::Minus) {
            let operand = self.nested(Self::unary)?;
            return Ok(Node::Unary(UnaryOp::Negate, Box::new(operand)));
        }
        if self.eat(&Token::Bang) {
            let operand = self.nested(Self::unary)?;
            return Ok(Node::Unary(UnaryOp::Not, Box::new(operand)));
        }
        if self.eat(&Token::Plus) {
            return self.nested(Self::unary);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let Some(spanned) = self.advance() else {
            return Err(ExpressionError::UnexpectedEnd {
                offset: self.source_len,
                expected: "a value",
            });
        };
        match spanned.token {
            Token::Number(number) => Ok(Node::Literal(super::number_value(number))),
            Token::Str(text) => Ok(Node::Literal(Value::String(text))),
            Token::True => Ok(Node::Literal(Value::Bool(true))),
            Token::False => Ok(Node::Literal(Value::Bool(false))),
            Token::Null => Ok(Node::Literal(Value::Null)),
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.eat(&Token::LParen) {
                    let function = Function::lookup(&name).ok_or_else(|| ExpressionError::UnknownFunction {
                        offset: spanned.offset,
                        name: name.clone(),
                    })?;
                    let arguments = self.arguments()?;
                    function.check_arity(arguments.len())?;
                    return Ok(Node::Call(function, arguments));
                }
                Ok(Node::Field(name))
            }
            other => Err(ExpressionError::UnexpectedToken {
                offset: spanned.offset,
                found: format!("{other:?}"),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Node>, ExpressionError> {
        let mut arguments = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.conditional()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen, "',' or ')' in argument list")?;
            return Ok(arguments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lexer::tokenize;

    fn parse_source(source: &str) -> Result<Node, ExpressionError> {
        parse(tokenize(source)?, source.len())
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let node = parse_source("a + b * 2").expect("parse");
        let Node::Binary(BinaryOp::Add, _, right) = node else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*right, Node::Binary(BinaryOp::Multiply, _, _)));
    }

    #[test]
    fn conditional_is_right_associative() {
        let node = parse_source("a ? 1 : b ? 2 : 3").expect("parse");
        let Node::Conditional { else_branch, .. } = node else {
            panic!("expected conditional");
        };
        assert!(matches!(*else_branch, Node::Conditional { .. }));
    }

    #[test]
    fn rejects_unknown_functions_and_trailing_tokens() {
        assert!(matches!(
            parse_source("eval(a)"),
            Err(ExpressionError::UnknownFunction { ref name, .. }) if name == "eval"
        ));
        assert!(matches!(parse_source("a b"), Err(ExpressionError::UnexpectedToken { .. })));
        assert!(matches!(parse_source("(a + 1"), Err(ExpressionError::UnexpectedEnd { .. })));
        assert!(matches!(parse_source(""), Err(ExpressionError::Empty)));
    }

    #[test]
    fn bounds_nesting_and_length() {
        let within = format!("{}1{}", "(".repeat(MAX_NESTING_DEPTH - 1), ")".repeat(MAX_NESTING_DEPTH - 1));
        assert!(parse_source(&within).is_ok());

        let nested = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert!(matches!(parse_source(&nested), Err(ExpressionError::TooLong { .. })));

        let deep = format!("{}1{}", "(".repeat(MAX_NESTING_DEPTH + 1), ")".repeat(MAX_NESTING_DEPTH + 1));
        assert!(matches!(parse_source(&deep), Err(ExpressionError::TooDeep { .. })));
        assert!(matches!(parse_source(&"-".repeat(200)), Err(ExpressionError::TooDeep { .. })));
        assert!(matches!(parse_source(&format!("1{}", " + 1".repeat(600))), Err(ExpressionError::TooLong { .. })));
    }

    #[test]
    fn checks_function_arity() {
        assert!(matches!(parse_source("pow(2)"), Err(ExpressionError::Arity { .. })));
        assert!(parse_source("max(a, b, c)").is_ok());
    }
}
