//! Query stripping.
//!
//! Stripping normalizes a query so only its *structure* keys the caches:
//! every literal is replaced by a parameter placeholder named after its
//! token position, and the stripped text is hashed with a stable FNV-1a.
//! Stripping is idempotent: placeholders tokenize as parameters and keep
//! their names, so re-stripping reproduces the same token stream and
//! hash.

use std::collections::BTreeMap;

use quiver_core::PropertyValue;

use crate::error::{QueryError, QueryResult};
use crate::value::Parameters;

/// One token of the simplified Cypher lexer, as stripped text.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// Punctuation, operators, identifiers, keywords: kept verbatim.
    Verbatim(String),
    /// A literal that was stripped to a positional placeholder.
    Literal(PropertyValue),
    /// A user `$parameter` reference.
    Parameter(String),
}

/// The result of stripping a query string.
#[derive(Debug, Clone)]
pub struct StrippedQuery {
    stripped: String,
    hash: u64,
    /// Literal values by token position.
    literals: BTreeMap<usize, PropertyValue>,
    /// User parameter names by token position.
    parameters: BTreeMap<usize, String>,
}

impl StrippedQuery {
    /// Strips a query.
    pub fn new(query: &str) -> QueryResult<Self> {
        let tokens = tokenize(query)?;

        let mut literals = BTreeMap::new();
        let mut parameters = BTreeMap::new();
        let mut parts = Vec::with_capacity(tokens.len());
        for (position, token) in tokens.into_iter().enumerate() {
            match token {
                Token::Verbatim(text) => parts.push(text),
                Token::Literal(value) => {
                    parts.push(format!("${position}"));
                    literals.insert(position, value);
                }
                Token::Parameter(name) => {
                    parts.push(format!("${name}"));
                    parameters.insert(position, name);
                }
            }
        }
        let stripped = parts.join(" ");
        let hash = fnv1a(stripped.as_bytes());
        Ok(Self { stripped, hash, literals, parameters })
    }

    /// The stripped query text.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.stripped
    }

    /// The stable hash of the stripped text.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The stripped literals as an initial parameter set.
    #[must_use]
    pub fn literals(&self) -> Parameters {
        let mut parameters = Parameters::new();
        for (&position, value) in &self.literals {
            parameters.add(position, value.clone());
        }
        parameters
    }

    /// User `$parameter` references by token position.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<usize, String> {
        &self.parameters
    }
}

/// 64-bit FNV-1a over the stripped text; stable across processes, which
/// is what lets dispatched plan ids and cache keys agree.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(query: &str) -> QueryResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        // Whitespace separates tokens and is otherwise dropped.
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        // Comments: // to end of line, /* ... */.
        if c == '/' {
            chars.next();
            match chars.peek() {
                Some('/') => {
                    for c in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                    continue;
                }
                Some('*') => {
                    chars.next();
                    let mut previous = '\0';
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if previous == '*' && c == '/' {
                            closed = true;
                            break;
                        }
                        previous = c;
                    }
                    if !closed {
                        return Err(QueryError::Syntax("unterminated block comment".into()));
                    }
                    continue;
                }
                _ => {
                    tokens.push(Token::Verbatim("/".into()));
                    continue;
                }
            }
        }

        // String literals with either quote kind and backslash escapes.
        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                if c == '\\' {
                    match chars.next() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => value.push(other),
                        None => break,
                    }
                } else if c == quote {
                    closed = true;
                    break;
                } else {
                    value.push(c);
                }
            }
            if !closed {
                return Err(QueryError::Syntax("unterminated string literal".into()));
            }
            tokens.push(Token::Literal(PropertyValue::String(value)));
            continue;
        }

        // Numbers.
        if c.is_ascii_digit() {
            let mut text = String::new();
            let mut is_double = false;
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    chars.next();
                } else if c == '.' && !is_double {
                    // Distinguish `1.5` from `1..2` in range patterns.
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    if lookahead.peek().is_some_and(char::is_ascii_digit) {
                        is_double = true;
                        text.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                } else {
                    break;
                }
            }
            let token = if is_double {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::Syntax(format!("invalid number: {text}")))?;
                Token::Literal(PropertyValue::Double(value))
            } else {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| QueryError::Syntax(format!("invalid number: {text}")))?;
                Token::Literal(PropertyValue::Int(value))
            };
            tokens.push(token);
            continue;
        }

        // Parameters: $name or $123 (the latter is what stripping itself
        // produces, which keeps stripping idempotent).
        if c == '$' {
            chars.next();
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if is_ident_continue(c) {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                return Err(QueryError::Syntax("empty parameter name".into()));
            }
            tokens.push(Token::Parameter(name));
            continue;
        }

        // Identifiers and keywords; true/false are literals.
        if is_ident_start(c) {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if is_ident_continue(c) {
                    text.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            match text.to_ascii_lowercase().as_str() {
                "true" => tokens.push(Token::Literal(PropertyValue::Bool(true))),
                "false" => tokens.push(Token::Literal(PropertyValue::Bool(false))),
                _ => tokens.push(Token::Verbatim(text)),
            }
            continue;
        }

        // Everything else is single-character punctuation, except the
        // two-character operators.
        chars.next();
        let mut text = String::from(c);
        if let Some(&next) = chars.peek() {
            let pair = (c, next);
            if matches!(pair, ('<', '=') | ('>', '=') | ('<', '>') | ('=', '~') | ('.', '.')) {
                text.push(next);
                chars.next();
            }
        }
        tokens.push(Token::Verbatim(text));
    }

    Ok(tokens)
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn stripping_is_idempotent_for_generated_queries(
            name in "[a-z]{1,8}",
            ints in proptest::collection::vec(any::<u32>(), 1..5),
            text in "[a-zA-Z0-9 ]{0,16}",
        ) {
            let list =
                ints.iter().map(u32::to_string).collect::<Vec<_>>().join(", ");
            let query = format!(
                "MATCH ({name}) WHERE {name}.p IN [{list}] AND {name}.q = '{text}' RETURN {name}"
            );
            let once = StrippedQuery::new(&query).unwrap();
            let twice = StrippedQuery::new(once.query()).unwrap();
            prop_assert_eq!(once.query(), twice.query());
            prop_assert_eq!(once.hash(), twice.hash());
        }

        #[test]
        fn literal_values_survive_stripping(value in any::<u32>()) {
            let stripped = StrippedQuery::new(&format!("RETURN {value}")).unwrap();
            let captured: Vec<_> = stripped.literals().iter().map(|(_, v)| v.clone()).collect();
            prop_assert_eq!(captured, vec![quiver_core::PropertyValue::Int(i64::from(value))]);
        }
    }
}
