//! Tokenizer for dynamic-field and transform expressions.

use super::ExpressionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Str(String),
    /// Field reference or function name. Dots are part of the identifier so
    /// flattened keys such as `token.symbol` read as one field.
    Ident(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    Bang,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
}

/// A token plus its byte offset in the source, used for error messages.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        let (offset, ch) = chars[index];
        if ch.is_whitespace() {
            index += 1;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && chars.get(index + 1).is_some_and(|(_, next)| next.is_ascii_digit())) {
            let start = index;
            while index < chars.len() && (chars[index].1.is_ascii_digit() || chars[index].1 == '.') {
                index += 1;
            }
            if index < chars.len() && matches!(chars[index].1, 'e' | 'E') {
                let exponent_start = index;
                index += 1;
                if index < chars.len() && matches!(chars[index].1, '+' | '-') {
                    index += 1;
                }
                if index < chars.len() && chars[index].1.is_ascii_digit() {
                    while index < chars.len() && chars[index].1.is_ascii_digit() {
                        index += 1;
                    }
                } else {
                    index = exponent_start;
                }
            }
            let text: String = chars[start..index].iter().map(|(_, c)| c).collect();
            let number = text.parse::<f64>().map_err(|_| ExpressionError::InvalidNumber { offset, text })?;
            tokens.push(Spanned {
                token: Token::Number(number),
                offset,
            });
            continue;
        }

        if is_identifier_start(ch) {
            let start = index;
            while index < chars.len() && is_identifier_continue(chars[index].1) {
                index += 1;
            }
            let text: String = chars[start..index].iter().map(|(_, c)| c).collect();
            let text = text.trim_end_matches('.').to_string();
            index = start + text.chars().count();
            let token = match text.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" | "undefined" => Token::Null,
                _ => Token::Ident(text),
            };
            tokens.push(Spanned { token, offset });
            continue;
        }

        if ch == '"' || ch == '\'' {
            let (text, next_index) = read_string(&chars, index, ch)?;
            tokens.push(Spanned {
                token: Token::Str(text),
                offset,
            });
            index = next_index;
            continue;
        }

        let next = chars.get(index + 1).map(|(_, c)| *c);
        let (token, width) = match (ch, next) {
            ('=', Some('=')) => (Token::EqEq, if chars.get(index + 2).map(|(_, c)| *c) == Some('=') { 3 } else { 2 }),
            ('!', Some('=')) => (Token::NotEq, if chars.get(index + 2).map(|(_, c)| *c) == Some('=') { 3 } else { 2 }),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('?', _) => (Token::Question, 1),
            (':', _) => (Token::Colon, 1),
            _ => return Err(ExpressionError::UnexpectedCharacter { offset, found: ch }),
        };
        tokens.push(Spanned { token, offset });
        index += width;
    }

    Ok(tokens)
}

fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$'
}

fn is_identifier_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '.'
}

fn read_string(chars: &[(usize, char)], start: usize, quote: char) -> Result<(String, usize), ExpressionError> {
    let mut text = String::new();
    let mut index = start + 1;
    while index < chars.len() {
        let ch = chars[index].1;
        if ch == quote {
            return Ok((text, index + 1));
        }
        if ch == '\\' {
            index += 1;
            let Some((_, escaped)) = chars.get(index) else {
                break;
            };
            text.push(match escaped {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other => *other,
            });
        } else {
            text.push(ch);
        }
        index += 1;
    }
    Err(ExpressionError::UnterminatedString { offset: chars[start].0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn dotted_identifiers_are_single_tokens() {
        assert_eq!(
            kinds("token.symbol + X.v"),
            vec![Token::Ident("token.symbol".into()), Token::Plus, Token::Ident("X.v".into())]
        );
    }

    #[test]
    fn numbers_and_strings() {
        assert_eq!(
            kinds("1.5e3 'it\\'s' \"x\""),
            vec![Token::Number(1500.0), Token::Str("it's".into()), Token::Str("x".into())]
        );
    }

    #[test]
    fn strict_equality_reads_as_equality() {
        assert_eq!(
            kinds("a === b !== c"),
            vec![
                Token::Ident("a".into()),
                Token::EqEq,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn reports_unterminated_string_and_bad_characters() {
        assert!(matches!(tokenize("'abc"), Err(ExpressionError::UnterminatedString { offset: 0 })));
        assert!(matches!(
            tokenize("a # b"),
            Err(ExpressionError::UnexpectedCharacter { found: '#', .. })
        ));
    }
}
