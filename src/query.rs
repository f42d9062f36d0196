//! Item query language used by `search`.
//!
//! ```text
//! expr := NAME | STRING | NUMBER          any value in the item matches
//!       | NAME '=' (STRING | NUMBER)      value at a dotted path matches
//!       | '(' expr ')'
//!       | expr '&' expr                   both match
//!       | expr '|' expr                   either matches
//! ```
//!
//! `&` and `|` share one precedence level and associate to the left.
//! Patterns must match a whole value; `*` stands for any run of characters.
//! Bare terms ignore case, `path=value` filters do not.

use regex::Regex;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while parsing a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("illegal character '{0}'")]
    IllegalCharacter(char),

    #[error("unterminated string")]
    UnterminatedString,

    #[error("syntax error near \"{0}\"")]
    Syntax(String),

    #[error("syntax error near end of input")]
    UnexpectedEnd,

    #[error("invalid pattern: {0}")]
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Str(String),
    Number(String),
    Equals,
    And,
    Or,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(s) | Self::Str(s) | Self::Number(s) => write!(f, "{s}"),
            Self::Equals => write!(f, "="),
            Self::And => write!(f, "&"),
            Self::Or => write!(f, "|"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '&' | '|' | '=' | '(' | ')' => {
                chars.next();
                tokens.push(match c {
                    '&' => Token::And,
                    '|' => Token::Or,
                    '=' => Token::Equals,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(ch) => text.push(ch),
                        None => return Err(QueryError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits.push(d);
                    chars.next();
                }
                tokens.push(Token::Number(digits));
            }
            c if is_name_char(c) => {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if !is_name_char(n) {
                        break;
                    }
                    name.push(n);
                    chars.next();
                }
                tokens.push(Token::Name(name));
            }
            other => return Err(QueryError::IllegalCharacter(other)),
        }
    }

    Ok(tokens)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '.' || c == '*'
}

/// A whole-value wildcard pattern.
#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    fn new(source: &str, ignore_case: bool) -> Result<Self, QueryError> {
        let body = source
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let flags = if ignore_case { "(?is)" } else { "(?s)" };
        let regex = Regex::new(&format!("{flags}^(?:{body})$"))
            .map_err(|e| QueryError::Pattern(e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    fn matches(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => self.regex.is_match(s),
            Value::Number(n) => self.regex.is_match(&n.to_string()),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Fuzzy(Pattern),
    Filter { path: String, pattern: Pattern },
    Union(Box<Expr>, Box<Expr>),
    Intersection(Box<Expr>, Box<Expr>),
}

impl Expr {
    fn matches(&self, item: &Value) -> bool {
        match self {
            Self::Fuzzy(pattern) => any_leaf(item, &|v| pattern.matches(v)),
            Self::Filter { path, pattern } => values_at(item, path)
                .into_iter()
                .any(|v| any_leaf(v, &|leaf| pattern.matches(leaf))),
            Self::Union(left, right) => left.matches(item) || right.matches(item),
            Self::Intersection(left, right) => left.matches(item) && right.matches(item),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuzzy(p) => write!(f, "{}", p.source),
            Self::Filter { path, pattern } => write!(f, "{}={}", path, pattern.source),
            Self::Union(l, r) => write!(f, "({l}|{r})"),
            Self::Intersection(l, r) => write!(f, "({l}&{r})"),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error_here(&self) -> QueryError {
        match self.peek() {
            Some(token) => QueryError::Syntax(token.to_string()),
            None => QueryError::UnexpectedEnd,
        }
    }

    fn expr(&mut self) -> Result<Expr, QueryError> {
        let mut left = self.primary()?;
        loop {
            let combine: fn(Box<Expr>, Box<Expr>) -> Expr = match self.peek() {
                Some(Token::And) => Expr::Intersection,
                Some(Token::Or) => Expr::Union,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.primary()?;
            left = combine(Box::new(left), Box::new(right));
        }
    }

    fn primary(&mut self) -> Result<Expr, QueryError> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error_here()),
                }
            }
            Some(Token::Name(name)) => {
                if self.peek() != Some(&Token::Equals) {
                    return Ok(Expr::Fuzzy(Pattern::new(&name, true)?));
                }
                self.pos += 1;
                match self.next() {
                    Some(Token::Str(value)) | Some(Token::Number(value)) => Ok(Expr::Filter {
                        path: name,
                        pattern: Pattern::new(&value, false)?,
                    }),
                    Some(other) => Err(QueryError::Syntax(other.to_string())),
                    None => Err(QueryError::UnexpectedEnd),
                }
            }
            Some(Token::Str(value)) | Some(Token::Number(value)) => {
                Ok(Expr::Fuzzy(Pattern::new(&value, true)?))
            }
            Some(other) => Err(QueryError::Syntax(other.to_string())),
            None => Err(QueryError::UnexpectedEnd),
        }
    }
}

/// A parsed query.
///
/// # Example
///
/// ```
/// use oppy::query::Query;
/// use serde_json::json;
///
/// let items = vec![
///     json!({"id": "1", "title": "GitHub", "category": "LOGIN"}),
///     json!({"id": "2", "title": "Bank", "category": "LOGIN"}),
///     json!({"id": "3", "title": "Wifi", "category": "PASSWORD"}),
/// ];
///
/// let query = Query::parse(r#"category="LOGIN" & git*"#)?;
/// let found = query.filter(&items);
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0]["title"], "GitHub");
/// # Ok::<(), oppy::query::QueryError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    expr: Expr,
}

impl Query {
    /// Parses a query expression.
    pub fn parse(input: &str) -> Result<Self, QueryError> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
        };
        let expr = parser.expr()?;
        if parser.peek().is_some() {
            return Err(parser.error_here());
        }
        Ok(Self { expr })
    }

    /// Returns true when `item` satisfies the query.
    pub fn matches(&self, item: &Value) -> bool {
        self.expr.matches(item)
    }

    /// Items satisfying the query, in their original order.
    pub fn filter<'a>(&self, items: &'a [Value]) -> Vec<&'a Value> {
        items.iter().filter(|item| self.matches(item)).collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

fn any_leaf(value: &Value, pred: &dyn Fn(&Value) -> bool) -> bool {
    match value {
        Value::Object(map) => map.values().any(|v| any_leaf(v, pred)),
        Value::Array(values) => values.iter().any(|v| any_leaf(v, pred)),
        leaf => pred(leaf),
    }
}

fn values_at<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for key in path.split('.').filter(|k| !k.is_empty()) {
        current = current
            .into_iter()
            .flat_map(|v| match v {
                Value::Array(values) => values.iter().filter_map(|e| e.get(key)).collect(),
                other => other.get(key).into_iter().collect::<Vec<_>>(),
            })
            .collect();
    }
    current
}
