//! The restricted expression language for `${…}` parameters.
//!
//! Hand-written lexer, recursive-descent parser, and tree-walking
//! evaluator. The grammar admits integer/string/boolean/null literals,
//! variables (one per upstream dependency in scope), field access on maps
//! and domain values, `+ - *`, the six comparisons, and the builtins
//! `decimal`, `min`, `max`. Nothing else: no loops, no lambdas, no I/O,
//! no user-defined functions, and no floats — a fractional literal fails at
//! lex time, and `decimal("…")` is the only path to fractional numerics.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::BigDecimal;

use crate::value::Value;
use crate::{Error, Result};

/// Evaluate an expression against the artifacts in scope.
///
/// Scope keys are the dependency ids visible to the vertex being resolved;
/// values are the corresponding upstream artifacts.
pub fn evaluate(expr: &str, scope: &BTreeMap<String, Value>) -> Result<Value> {
    let ast = parse(expr)?;
    eval(&ast, expr, scope)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
    Dot,
}

fn parse_error(expr: &str, message: impl Into<String>) -> Error {
    Error::ParseError {
        expr: expr.to_string(),
        message: message.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                if let Some(&(_, '.')) = chars.peek() {
                    return Err(Error::FloatForbidden {
                        context: format!(
                            "fractional literal in expression `{source}`; use decimal(\"…\")"
                        ),
                    });
                }
                let text = &source[start..end];
                let parsed = i64::from_str(text)
                    .map_err(|_| parse_error(source, format!("integer literal `{text}` out of range")))?;
                tokens.push(Token::Int(parsed));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match &source[start..end] {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    ident => Token::Ident(ident.to_string()),
                });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, '"')) => text.push('"'),
                            Some((_, '\\')) => text.push('\\'),
                            Some((_, 'n')) => text.push('\n'),
                            Some((_, 't')) => text.push('\t'),
                            Some((_, other)) => {
                                return Err(parse_error(
                                    source,
                                    format!("unsupported escape `\\{other}`"),
                                ))
                            }
                            None => return Err(parse_error(source, "unterminated string literal")),
                        },
                        Some((_, other)) => text.push(other),
                        None => return Err(parse_error(source, "unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(text));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::EqEq);
                    }
                    _ => return Err(parse_error(source, "expected `==`, found lone `=`")),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => return Err(parse_error(source, "expected `!=`, found lone `!`")),
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            other => {
                return Err(parse_error(source, format!("unexpected character `{other}`")))
            }
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Str(String),
    Bool(bool),
    Null,
    Var(String),
    Field(Box<Expr>, String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Builtin, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Decimal,
    Min,
    Max,
}

impl Builtin {
    fn arity(self) -> usize {
        match self {
            Builtin::Decimal => 1,
            Builtin::Min | Builtin::Max => 2,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Builtin::Decimal => "decimal",
            Builtin::Min => "min",
            Builtin::Max => "max",
        }
    }
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

fn parse(source: &str) -> Result<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.comparison()?;
    if parser.pos != parser.tokens.len() {
        return Err(parse_error(source, "unexpected trailing tokens"));
    }
    Ok(expr)
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<()> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(parse_error(self.source, format!("expected {what}")))
        }
    }

    // Comparisons do not chain: `a < b < c` is a parse error.
    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::Star) {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(BinOp::Mul, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Token::Dot) {
            self.pos += 1;
            match self.advance() {
                Some(Token::Ident(field)) => {
                    expr = Expr::Field(Box::new(expr), field);
                }
                _ => return Err(parse_error(self.source, "expected field name after `.`")),
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Int(i)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                self.expect(&Token::RParen, "closing `)`")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Ok(Expr::Var(name));
                }
                self.pos += 1;
                let builtin = match name.as_str() {
                    "decimal" => Builtin::Decimal,
                    "min" => Builtin::Min,
                    "max" => Builtin::Max,
                    other => {
                        return Err(parse_error(
                            self.source,
                            format!("unknown function `{other}`"),
                        ))
                    }
                };
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.comparison()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(&Token::RParen, "closing `)`")?;
                if args.len() != builtin.arity() {
                    return Err(parse_error(
                        self.source,
                        format!(
                            "`{}` takes {} argument(s), got {}",
                            builtin.name(),
                            builtin.arity(),
                            args.len()
                        ),
                    ));
                }
                Ok(Expr::Call(builtin, args))
            }
            _ => Err(parse_error(self.source, "expected a value")),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

fn type_mismatch(source: &str, message: impl Into<String>) -> Error {
    Error::TypeMismatch {
        context: format!("expression `{source}`"),
        message: message.into(),
    }
}

fn eval(expr: &Expr, source: &str, scope: &BTreeMap<String, Value>) -> Result<Value> {
    match expr {
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Str(s) => Ok(Value::Str(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Null => Ok(Value::Null),
        Expr::Var(name) => scope.get(name).cloned().ok_or_else(|| Error::UnknownDependency {
            name: name.clone(),
        }),
        Expr::Field(inner, field) => {
            let value = eval(inner, source, scope)?;
            match &value {
                Value::Map(entries) => entries.get(field).cloned().ok_or_else(|| {
                    type_mismatch(source, format!("map has no key `{field}`"))
                }),
                Value::Domain(d) => d.field(field).ok_or_else(|| {
                    type_mismatch(
                        source,
                        format!("{} has no field `{field}`", d.type_name()),
                    )
                }),
                other => Err(type_mismatch(
                    source,
                    format!("cannot access field `{field}` on {}", other.kind()),
                )),
            }
        }
        Expr::Neg(inner) => match eval(inner, source, scope)? {
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| type_mismatch(source, "integer overflow in negation")),
            Value::Dec(d) => Ok(Value::Dec(-d)),
            other => Err(type_mismatch(
                source,
                format!("cannot negate {}", other.kind()),
            )),
        },
        Expr::Binary(op, lhs, rhs) => {
            let left = eval(lhs, source, scope)?;
            let right = eval(rhs, source, scope)?;
            apply_binary(*op, left, right, source)
        }
        Expr::Call(builtin, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, source, scope)?);
            }
            match builtin {
                Builtin::Decimal => {
                    let arg = values.pop().expect("arity checked at parse");
                    builtin_decimal(arg, source)
                }
                Builtin::Min | Builtin::Max => {
                    let b = values.pop().expect("arity checked at parse");
                    let a = values.pop().expect("arity checked at parse");
                    builtin_min_max(*builtin == Builtin::Min, a, b, source)
                }
            }
        }
    }
}

fn apply_binary(op: BinOp, left: Value, right: Value, source: &str) -> Result<Value> {
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&left, &right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare_values(&left, &right, source)?;
            let holds = match op {
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Le => ordering != Ordering::Greater,
                BinOp::Gt => ordering == Ordering::Greater,
                BinOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(holds))
        }
        BinOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| type_mismatch(source, "integer overflow in `+`")),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (a, b) => numeric_pair(&a, &b)
                .map(|(x, y)| Value::Dec(x + y))
                .ok_or_else(|| {
                    type_mismatch(source, format!("cannot add {} and {}", a.kind(), b.kind()))
                }),
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| type_mismatch(source, "integer overflow in `-`")),
            (a, b) => numeric_pair(&a, &b)
                .map(|(x, y)| Value::Dec(x - y))
                .ok_or_else(|| {
                    type_mismatch(
                        source,
                        format!("cannot subtract {} from {}", b.kind(), a.kind()),
                    )
                }),
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| type_mismatch(source, "integer overflow in `*`")),
            (a, b) => numeric_pair(&a, &b)
                .map(|(x, y)| Value::Dec(x * y))
                .ok_or_else(|| {
                    type_mismatch(
                        source,
                        format!("cannot multiply {} and {}", a.kind(), b.kind()),
                    )
                }),
        },
    }
}

/// Both operands as decimals, when at least one is `Dec` and the other is
/// numeric.
fn numeric_pair(a: &Value, b: &Value) -> Option<(BigDecimal, BigDecimal)> {
    match (a, b) {
        (Value::Dec(x), Value::Dec(y)) => Some((x.clone(), y.clone())),
        (Value::Dec(x), Value::Int(y)) => Some((x.clone(), BigDecimal::from(*y))),
        (Value::Int(x), Value::Dec(y)) => Some((BigDecimal::from(*x), y.clone())),
        _ => None,
    }
}

/// Structural equality with Int/Dec numeric promotion.
fn values_equal(a: &Value, b: &Value) -> bool {
    if let Some((x, y)) = numeric_pair(a, b) {
        return x == y;
    }
    a == b
}

/// Total ordering on comparable values: Int, Dec (mixed promotes), Str.
fn compare_values(a: &Value, b: &Value, source: &str) -> Result<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => numeric_pair(a, b).map(|(x, y)| x.cmp(&y)).ok_or_else(|| {
            type_mismatch(
                source,
                format!("cannot compare {} and {}", a.kind(), b.kind()),
            )
        }),
    }
}

/// The `value` field of a composite, when present: a map entry keyed
/// `value`, or a domain field named `value`.
pub(crate) fn composite_value_field(value: &Value) -> Option<Value> {
    match value {
        Value::Map(entries) => entries.get("value").cloned(),
        Value::Domain(d) => d.field("value"),
        _ => None,
    }
}

fn builtin_decimal(arg: Value, source: &str) -> Result<Value> {
    if let Some(inner) = composite_value_field(&arg) {
        return builtin_decimal(inner, source);
    }
    match arg {
        Value::Dec(d) => Ok(Value::Dec(d)),
        Value::Int(i) => Ok(Value::Dec(BigDecimal::from(i))),
        Value::Str(s) => BigDecimal::from_str(&s)
            .map(Value::Dec)
            .map_err(|_| type_mismatch(source, format!("`{s}` is not a decimal"))),
        other => Err(type_mismatch(
            source,
            format!("decimal() cannot coerce {}", other.kind()),
        )),
    }
}

/// `min`/`max`: composites with a `value` field compare through that field,
/// but the returned value is the original argument.
fn builtin_min_max(want_min: bool, a: Value, b: Value, source: &str) -> Result<Value> {
    let key_a = composite_value_field(&a).unwrap_or_else(|| a.clone());
    let key_b = composite_value_field(&b).unwrap_or_else(|| b.clone());
    let ordering = compare_values(&key_a, &key_b, source)?;
    let pick_a = if want_min {
        ordering != Ordering::Greater
    } else {
        ordering != Ordering::Less
    };
    Ok(if pick_a { a } else { b })
}
