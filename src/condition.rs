//! Expression parser and evaluator for rule condition templates.
//!
//! Supported syntax:
//! - Attribute placeholders: `{score}`, `{level}`
//! - Comparisons: `==`, `!=`, `>`, `<`, `>=`, `<=`
//! - Boolean connectives: `and`, `or` (the `&&` / `||` spellings are accepted)
//! - Literals: integers, floats, `"strings"` / `'strings'`, `true`, `false`
//! - Parentheses for grouping
//!
//! Comparisons bind tighter than `and`, which binds tighter than `or`.
//! Templates are parsed into an AST and evaluated against the subject's
//! attribute record; no dynamic code execution is involved.

use crate::errors::AuthError;
use crate::types::Attributes;
use serde_json::Value;

// ─── AST ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LitValue),
    Attr(String),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LitValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

// ─── Tokenizer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Attr(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    LParen,
    RParen,
    Eq,  // ==
    Ne,  // !=
    Gt,  // >
    Lt,  // <
    Ge,  // >=
    Le,  // <=
    And, // and, &&
    Or,  // or, ||
}

fn tokenize(input: &str) -> Result<Vec<Token>, AuthError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != '}' {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(AuthError::InvalidCondition(
                        "unterminated attribute placeholder".into(),
                    ));
                }
                let name: String = chars[start..i].iter().collect();
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(AuthError::InvalidCondition(format!(
                        "invalid attribute placeholder `{{{name}}}`"
                    )));
                }
                tokens.push(Token::Attr(name));
                i += 1; // skip closing brace
            }
            '=' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '>' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if i + 1 < chars.len() && chars[i + 1] == '=' => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '&' if i + 1 < chars.len() && chars[i + 1] == '&' => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if i + 1 < chars.len() && chars[i + 1] == '|' => {
                tokens.push(Token::Or);
                i += 2;
            }
            quote @ ('"' | '\'') => {
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(AuthError::InvalidCondition(
                        "unterminated string literal".into(),
                    ));
                }
                let s: String = chars[start..i].iter().collect();
                tokens.push(Token::Str(s));
                i += 1; // skip closing quote
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                if num_str.contains('.') {
                    let f: f64 = num_str.parse().map_err(|_| {
                        AuthError::InvalidCondition(format!("invalid float `{num_str}`"))
                    })?;
                    tokens.push(Token::Float(f));
                } else {
                    let n: i64 = num_str.parse().map_err(|_| {
                        AuthError::InvalidCondition(format!("invalid integer `{num_str}`"))
                    })?;
                    tokens.push(Token::Int(n));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" | "AND" => tokens.push(Token::And),
                    "or" | "OR" => tokens.push(Token::Or),
                    "true" => tokens.push(Token::True),
                    "false" => tokens.push(Token::False),
                    _ => {
                        return Err(AuthError::InvalidCondition(format!(
                            "unexpected identifier `{word}` (attributes are written as `{{{word}}}`)"
                        )));
                    }
                }
            }
            c => {
                return Err(AuthError::InvalidCondition(format!(
                    "unexpected character `{c}`"
                )));
            }
        }
    }
    Ok(tokens)
}

// ─── Parser ─────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect_rparen(&mut self) -> Result<(), AuthError> {
        if self.advance() != Some(Token::RParen) {
            return Err(AuthError::InvalidCondition(
                "expected closing parenthesis `)`".into(),
            ));
        }
        Ok(())
    }

    /// Entry: parse_or
    fn parse_expr(&mut self) -> Result<Expr, AuthError> {
        self.parse_or()
    }

    /// or_expr = and_expr ("or" and_expr)*
    fn parse_or(&mut self) -> Result<Expr, AuthError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::BinOp {
                op: BinOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// and_expr = comparison ("and" comparison)*
    fn parse_and(&mut self) -> Result<Expr, AuthError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::BinOp {
                op: BinOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    /// comparison = primary (("==" | "!=" | ">" | "<" | ">=" | "<=") primary)?
    fn parse_comparison(&mut self) -> Result<Expr, AuthError> {
        let left = self.parse_primary()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::Le) => BinOp::Le,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_primary()?;
        Ok(Expr::BinOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// primary = literal | attribute | "(" expr ")"
    fn parse_primary(&mut self) -> Result<Expr, AuthError> {
        match self.peek().cloned() {
            Some(Token::Int(n)) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Int(n)))
            }
            Some(Token::Float(f)) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Float(f)))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Str(s)))
            }
            Some(Token::True) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Bool(true)))
            }
            Some(Token::False) => {
                self.advance();
                Ok(Expr::Literal(LitValue::Bool(false)))
            }
            Some(Token::Attr(name)) => {
                self.advance();
                Ok(Expr::Attr(name))
            }
            Some(Token::LParen) => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            other => Err(AuthError::InvalidCondition(format!(
                "unexpected token: {other:?}"
            ))),
        }
    }
}

/// Parse a condition template into an AST.
pub fn parse_condition(input: &str) -> Result<Expr, AuthError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(AuthError::InvalidCondition("empty expression".into()));
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(AuthError::InvalidCondition(format!(
            "unexpected trailing token: {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

// ─── Evaluator ──────────────────────────────────────────────────────────

/// Evaluate a parsed expression against a subject's attribute record.
/// Returns `true` if the condition is satisfied.
///
/// A placeholder whose attribute is absent (or null) yields
/// `AuthError::MissingAttribute`; the resolver treats that as the rule not
/// passing.
pub fn evaluate(expr: &Expr, attributes: &Attributes) -> Result<bool, AuthError> {
    match eval_value(expr, attributes)? {
        Scalar::Bool(b) => Ok(b),
        other => Err(AuthError::InvalidCondition(format!(
            "condition must evaluate to boolean, got: {other:?}"
        ))),
    }
}

#[derive(Debug, Clone)]
enum Scalar {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Scalar {
    /// Numeric view. Attribute records loaded from text-typed database
    /// columns carry numbers as strings, so numeric-looking strings count.
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(n) => Some(*n as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Str(s) => s.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    fn loosely_eq(&self, other: &Scalar) -> bool {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a == b;
        }
        match (self, other) {
            (Scalar::Str(a), Scalar::Str(b)) => a == b,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            _ => false,
        }
    }
}

fn eval_value(expr: &Expr, attributes: &Attributes) -> Result<Scalar, AuthError> {
    match expr {
        Expr::Literal(lit) => Ok(match lit {
            LitValue::Int(n) => Scalar::Int(*n),
            LitValue::Float(f) => Scalar::Float(*f),
            LitValue::Str(s) => Scalar::Str(s.clone()),
            LitValue::Bool(b) => Scalar::Bool(*b),
        }),
        Expr::Attr(name) => match attributes.get(name) {
            None | Some(Value::Null) => Err(AuthError::MissingAttribute(name.clone())),
            Some(Value::Bool(b)) => Ok(Scalar::Bool(*b)),
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Ok(Scalar::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Scalar::Float(f))
                } else {
                    Err(AuthError::InvalidCondition(format!(
                        "attribute `{name}` is not a representable number"
                    )))
                }
            }
            Some(Value::String(s)) => Ok(Scalar::Str(s.clone())),
            Some(Value::Array(_)) | Some(Value::Object(_)) => Err(AuthError::InvalidCondition(
                format!("attribute `{name}` is not a scalar"),
            )),
        },
        Expr::BinOp { op, left, right } => {
            let l = eval_value(left, attributes)?;
            let r = eval_value(right, attributes)?;
            match op {
                BinOp::And => match (&l, &r) {
                    (Scalar::Bool(a), Scalar::Bool(b)) => Ok(Scalar::Bool(*a && *b)),
                    _ => Err(AuthError::InvalidCondition(
                        "`and` requires boolean operands".into(),
                    )),
                },
                BinOp::Or => match (&l, &r) {
                    (Scalar::Bool(a), Scalar::Bool(b)) => Ok(Scalar::Bool(*a || *b)),
                    _ => Err(AuthError::InvalidCondition(
                        "`or` requires boolean operands".into(),
                    )),
                },
                BinOp::Eq => Ok(Scalar::Bool(l.loosely_eq(&r))),
                BinOp::Ne => Ok(Scalar::Bool(!l.loosely_eq(&r))),
                BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                    let lf = l.as_f64().ok_or_else(|| {
                        AuthError::InvalidCondition(
                            "ordering comparison requires numeric operands".into(),
                        )
                    })?;
                    let rf = r.as_f64().ok_or_else(|| {
                        AuthError::InvalidCondition(
                            "ordering comparison requires numeric operands".into(),
                        )
                    })?;
                    let result = match op {
                        BinOp::Gt => lf > rf,
                        BinOp::Lt => lf < rf,
                        BinOp::Ge => lf >= rf,
                        BinOp::Le => lf <= rf,
                        _ => unreachable!(),
                    };
                    Ok(Scalar::Bool(result))
                }
            }
        }
    }
}
