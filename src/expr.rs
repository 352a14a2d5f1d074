//! Expression Module for the Template Compiler
//!
//! Marker attributes (`condition`, `items`, `path`, dynamic attribute values)
//! carry a small expression language: dotted paths, literals, negation,
//! comparisons and boolean connectives. The same tree is evaluated by the
//! preview renderer and printed by every dialect emitter.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// AST
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `user.profile.name`; segments are never empty
    Path(Vec<String>),
    Literal(Value),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid expression `{source_text}` at offset {offset}: {message}")]
pub struct ExprError {
    pub source_text: String,
    pub offset: usize,
    pub message: String,
}

impl Expr {
    pub fn path(dotted: &str) -> Expr {
        Expr::Path(dotted.split('.').map(|s| s.to_string()).collect())
    }

    pub fn string(value: &str) -> Expr {
        Expr::Literal(Value::String(value.to_string()))
    }

    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.pos) {
            return Err(ExprError {
                source_text: source.to_string(),
                offset: *offset,
                message: format!("unexpected token {:?}", token),
            });
        }
        Ok(expr)
    }

    pub fn as_path(&self) -> Option<&[String]> {
        match self {
            Expr::Path(segments) => Some(segments),
            _ => None,
        }
    }

    pub fn dotted(segments: &[String]) -> String {
        segments.join(".")
    }

    /// Every path referenced by the expression, in source order.
    pub fn paths(&self) -> Vec<&[String]> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a [String]>) {
        match self {
            Expr::Path(segments) => out.push(segments),
            Expr::Literal(_) => {}
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::Binary { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
        }
    }

    /// Rebuild the expression, letting `f` replace any path.
    pub fn map_paths(&self, f: &mut dyn FnMut(&[String]) -> Option<Expr>) -> Expr {
        match self {
            Expr::Path(segments) => f(segments).unwrap_or_else(|| self.clone()),
            Expr::Literal(_) => self.clone(),
            Expr::Not(inner) => Expr::Not(Box::new(inner.map_paths(f))),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.map_paths(f)),
                right: Box::new(right.map_paths(f)),
            },
        }
    }

    /// Truthiness when the expression does not depend on data.
    pub fn static_truthiness(&self) -> Option<bool> {
        match self {
            Expr::Literal(value) => Some(truthy(value)),
            Expr::Path(_) => None,
            Expr::Not(inner) => inner.static_truthiness().map(|b| !b),
            Expr::Binary { .. } => {
                if self.paths().is_empty() {
                    Some(truthy(&self.evaluate(&mut |_| Value::Null)))
                } else {
                    None
                }
            }
        }
    }

    pub fn evaluate(&self, lookup: &mut dyn FnMut(&[String]) -> Value) -> Value {
        match self {
            Expr::Path(segments) => lookup(segments),
            Expr::Literal(value) => value.clone(),
            Expr::Not(inner) => Value::Bool(!truthy(&inner.evaluate(lookup))),
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let l = left.evaluate(lookup);
                    if !truthy(&l) {
                        return l;
                    }
                    right.evaluate(lookup)
                }
                BinaryOp::Or => {
                    let l = left.evaluate(lookup);
                    if truthy(&l) {
                        return l;
                    }
                    right.evaluate(lookup)
                }
                _ => {
                    let l = left.evaluate(lookup);
                    let r = right.evaluate(lookup);
                    Value::Bool(compare(*op, &l, &r))
                }
            },
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(segments) => write!(f, "{}", segments.join(".")),
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Not(inner) => match inner.as_ref() {
                Expr::Binary { .. } => write!(f, "!({})", inner),
                _ => write!(f, "!{}", inner),
            },
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op.symbol(), right),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE SEMANTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Empty arrays count as false so a loop source can double as a condition.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    };

    match op {
        BinaryOp::Eq => ordering == Some(Ordering::Equal) || (ordering.is_none() && left == right),
        BinaryOp::Ne => !(ordering == Some(Ordering::Equal) || (ordering.is_none() && left == right)),
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::And | BinaryOp::Or => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENIZER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(Vec<String>),
    Str(String),
    Number(f64),
    Op(BinaryOp),
    Bang,
    LParen,
    RParen,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || c == '@'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-'
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let err = |offset: usize, message: &str| ExprError {
        source_text: source.to_string(),
        offset,
        message: message.to_string(),
    };

    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push((offset, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((offset, Token::RParen));
                i += 1;
            }
            '!' => {
                if chars.get(i + 1).map(|(_, c)| *c) == Some('=') {
                    tokens.push((offset, Token::Op(BinaryOp::Ne)));
                    i += 2;
                } else {
                    tokens.push((offset, Token::Bang));
                    i += 1;
                }
            }
            '=' => {
                if chars.get(i + 1).map(|(_, c)| *c) != Some('=') {
                    return Err(err(offset, "assignment is not allowed, use `==`"));
                }
                // Accept `===` as an alias for `==`
                let width = if chars.get(i + 2).map(|(_, c)| *c) == Some('=') {
                    3
                } else {
                    2
                };
                tokens.push((offset, Token::Op(BinaryOp::Eq)));
                i += width;
            }
            '<' | '>' => {
                let has_eq = chars.get(i + 1).map(|(_, c)| *c) == Some('=');
                let op = match (c, has_eq) {
                    ('<', true) => BinaryOp::Le,
                    ('<', false) => BinaryOp::Lt,
                    (_, true) => BinaryOp::Ge,
                    _ => BinaryOp::Gt,
                };
                tokens.push((offset, Token::Op(op)));
                i += if has_eq { 2 } else { 1 };
            }
            '&' | '|' => {
                if chars.get(i + 1).map(|(_, c)| *c) != Some(c) {
                    return Err(err(offset, "expected `&&` or `||`"));
                }
                let op = if c == '&' { BinaryOp::And } else { BinaryOp::Or };
                tokens.push((offset, Token::Op(op)));
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                let mut closed = false;
                while j < chars.len() {
                    let (_, ch) = chars[j];
                    if ch == '\\' && j + 1 < chars.len() {
                        value.push(chars[j + 1].1);
                        j += 2;
                        continue;
                    }
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    value.push(ch);
                    j += 1;
                }
                if !closed {
                    return Err(err(offset, "unterminated string literal"));
                }
                tokens.push((offset, Token::Str(value)));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let end = chars.get(j).map(|(o, _)| *o).unwrap_or(source.len());
                let text = &source[offset..end];
                let number: f64 = text
                    .parse()
                    .map_err(|_| err(offset, "malformed number literal"))?;
                tokens.push((offset, Token::Number(number)));
                i = j;
            }
            c if is_ident_start(c) => {
                let mut segments = Vec::new();
                let mut current = String::new();
                let mut j = i;
                while j < chars.len() {
                    let ch = chars[j].1;
                    if is_ident_char(ch) || (current.is_empty() && is_ident_start(ch)) {
                        current.push(ch);
                        j += 1;
                    } else if ch == '.' && !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                        j += 1;
                    } else {
                        break;
                    }
                }
                if current.is_empty() {
                    return Err(err(chars[j - 1].0, "path cannot end with `.`"));
                }
                segments.push(current);
                tokens.push((offset, Token::Path(segments)));
                i = j;
            }
            _ => return Err(err(offset, &format!("unexpected character `{}`", c))),
        }
    }

    if tokens.is_empty() {
        return Err(err(0, "expression is empty"));
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[(usize, char)], i: usize) -> bool {
    chars
        .get(i + 1)
        .map(|(_, c)| c.is_ascii_digit())
        .unwrap_or(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSER
// ═══════════════════════════════════════════════════════════════════════════════

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn error(&self, message: &str) -> ExprError {
        let offset = self
            .tokens
            .get(self.pos)
            .map(|(o, _)| *o)
            .unwrap_or(self.source.len());
        ExprError {
            source_text: self.source.to_string(),
            offset,
            message: message.to_string(),
        }
    }

    fn peek_op(&self) -> Option<BinaryOp> {
        match self.tokens.get(self.pos) {
            Some((_, Token::Op(op))) => Some(*op),
            _ => None,
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek_op() == Some(BinaryOp::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        while self.peek_op() == Some(BinaryOp::And) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_unary()?;
        match self.peek_op() {
            Some(op) if !op.is_logical() => {
                self.pos += 1;
                let right = self.parse_unary()?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            _ => Ok(left),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if let Some((_, Token::Bang)) = self.tokens.get(self.pos) {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = match self.tokens.get(self.pos) {
            Some((_, token)) => token.clone(),
            None => return Err(self.error("unexpected end of expression")),
        };
        self.pos += 1;

        match token {
            Token::Path(segments) => Ok(match segments.as_slice() {
                [single] if single == "true" => Expr::Literal(Value::Bool(true)),
                [single] if single == "false" => Expr::Literal(Value::Bool(false)),
                [single] if single == "null" || single == "undefined" => {
                    Expr::Literal(Value::Null)
                }
                _ => Expr::Path(segments),
            }),
            Token::Str(value) => Ok(Expr::Literal(Value::String(value))),
            Token::Number(n) => Ok(Expr::Literal(number_value(n))),
            Token::LParen => {
                let inner = self.parse_or()?;
                match self.tokens.get(self.pos) {
                    Some((_, Token::RParen)) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("expected `)`")),
                }
            }
            _ => {
                self.pos -= 1;
                Err(self.error("expected a path, literal or `(`"))
            }
        }
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
