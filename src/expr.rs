//! The expression sub-language: lexer, parser and interpreter.
//!
//! Expressions are parsed once at compile time (the standalone syntax
//! pre-check) and evaluated against a [`Scope`] at render time. The
//! language covers literals, scope paths, index access, a small builtin
//! method set, arithmetic, comparisons, logical operators and the
//! ternary conditional.

use crate::scope::Scope;
use crate::value::Value;
use std::collections::HashMap;

/// A syntax fault inside an expression, with its byte offset in the
/// expression text.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
}

impl SyntaxError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, String, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Loop header of a FOR block.
#[derive(Debug, Clone, PartialEq)]
pub struct ForHeader {
    pub item: String,
    pub index: Option<String>,
    pub mode: IterMode,
    pub iterable: Expr,
}

/// `of` iterates array items, `in` iterates object keys or array indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterMode {
    Of,
    In,
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

const PUNCTS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "+", "-", "*", "/", "%", "!", "<", ">", "(", ")", "[",
    "]", ".", ",", "?", ":",
];

fn tokenize(src: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let bytes = src.as_bytes();
    let mut pos = 0;
    'outer: while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        if c == '"' || c == '\'' || c == '`' {
            let (s, next) = lex_string(src, pos, c)?;
            tokens.push(Token {
                tok: Tok::Str(s),
                offset: pos,
            });
            pos = next;
            continue;
        }
        if c.is_ascii_digit() {
            let (tok, next) = lex_number(src, pos)?;
            tokens.push(Token { tok, offset: pos });
            pos = next;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = pos;
            while pos < bytes.len()
                && ((bytes[pos] as char).is_ascii_alphanumeric() || bytes[pos] == b'_')
            {
                pos += 1;
            }
            tokens.push(Token {
                tok: Tok::Ident(src[start..pos].to_owned()),
                offset: start,
            });
            continue;
        }
        for p in PUNCTS {
            if src[pos..].starts_with(p) {
                tokens.push(Token {
                    tok: Tok::Punct(p),
                    offset: pos,
                });
                pos += p.len();
                continue 'outer;
            }
        }
        return Err(SyntaxError::new(format!("unexpected character '{c}'"), pos));
    }
    tokens.push(Token {
        tok: Tok::Eof,
        offset: src.len(),
    });
    Ok(tokens)
}

fn lex_string(src: &str, start: usize, quote: char) -> Result<(String, usize), SyntaxError> {
    let mut out = String::new();
    let mut chars = src[start + 1..].char_indices();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((out, start + 1 + i + c.len_utf8()));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, e)) => out.push(match e {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                }),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(SyntaxError::new("unterminated string literal", start))
}

fn lex_number(src: &str, start: usize) -> Result<(Tok, usize), SyntaxError> {
    let bytes = src.as_bytes();
    let mut pos = start;
    let mut float = false;
    while pos < bytes.len() {
        let c = bytes[pos] as char;
        if c.is_ascii_digit() {
            pos += 1;
        } else if c == '.' && !float && pos + 1 < bytes.len() && bytes[pos + 1].is_ascii_digit() {
            float = true;
            pos += 1;
        } else {
            break;
        }
    }
    let text = &src[start..pos];
    let tok = if float {
        match text.parse::<f64>() {
            Ok(f) => Tok::Float(f),
            Err(_) => return Err(SyntaxError::new("invalid number literal", start)),
        }
    } else {
        match text.parse::<i64>() {
            Ok(i) => Tok::Int(i),
            Err(_) => return Err(SyntaxError::new("integer literal out of range", start)),
        }
    };
    Ok((tok, pos))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, punct: &str) -> bool {
        if let Tok::Punct(p) = &self.current().tok {
            if *p == punct {
                self.advance();
                return true;
            }
        }
        false
    }

    fn expect(&mut self, punct: &'static str) -> Result<(), SyntaxError> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(SyntaxError::new(
                format!("expected '{punct}'"),
                self.current().offset,
            ))
        }
    }

    fn ident(&mut self) -> Result<String, SyntaxError> {
        match self.current().tok.clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(SyntaxError::new(
                "expected an identifier",
                self.current().offset,
            )),
        }
    }

    fn ternary(&mut self) -> Result<Expr, SyntaxError> {
        let cond = self.or()?;
        if self.eat("?") {
            let then = self.ternary()?;
            self.expect(":")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.and()?;
        while self.eat("||") {
            let rhs = self.and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.equality()?;
        while self.eat("&&") {
            let rhs = self.equality()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.relational()?;
        loop {
            let op = if self.eat("==") {
                BinOp::Eq
            } else if self.eat("!=") {
                BinOp::Ne
            } else {
                return Ok(lhs);
            };
            let rhs = self.relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn relational(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.additive()?;
        loop {
            let op = if self.eat("<=") {
                BinOp::Le
            } else if self.eat(">=") {
                BinOp::Ge
            } else if self.eat("<") {
                BinOp::Lt
            } else if self.eat(">") {
                BinOp::Gt
            } else {
                return Ok(lhs);
            };
            let rhs = self.additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn additive(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat("+") {
                BinOp::Add
            } else if self.eat("-") {
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat("*") {
                BinOp::Mul
            } else if self.eat("/") {
                BinOp::Div
            } else if self.eat("%") {
                BinOp::Rem
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        if self.eat("!") {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.unary()?)));
        }
        if self.eat("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(".") {
                let name = self.ident()?;
                if self.eat("(") {
                    let mut args = Vec::new();
                    if !self.eat(")") {
                        loop {
                            args.push(self.ternary()?);
                            if self.eat(")") {
                                break;
                            }
                            self.expect(",")?;
                        }
                    }
                    expr = Expr::Call(Box::new(expr), name, args);
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.eat("[") {
                let index = self.ternary()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let token = self.current().clone();
        match token.tok {
            Tok::Int(i) => {
                self.advance();
                Ok(Expr::Int(i))
            }
            Tok::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            Tok::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Tok::Ident(name) => {
                self.advance();
                match name.as_str() {
                    "true" => Ok(Expr::Bool(true)),
                    "false" => Ok(Expr::Bool(false)),
                    "null" => Ok(Expr::Null),
                    _ => Ok(Expr::Ident(name)),
                }
            }
            Tok::Punct("(") => {
                self.advance();
                let inner = self.ternary()?;
                self.expect(")")?;
                Ok(inner)
            }
            Tok::Punct(p) => Err(SyntaxError::new(
                format!("unexpected '{p}'"),
                token.offset,
            )),
            Tok::Eof => Err(SyntaxError::new("unexpected end of expression", token.offset)),
        }
    }
}

/// Parse an expression. Used both as the compile-time syntax pre-check
/// and to build the evaluated form.
pub fn parse(text: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    let expr = parser.ternary()?;
    match parser.current().tok {
        Tok::Eof => Ok(expr),
        _ => Err(SyntaxError::new(
            "unexpected trailing tokens",
            parser.current().offset,
        )),
    }
}

/// Parse a FOR header: `item of expr`, `item, index of expr` or
/// `key in expr`.
pub fn parse_for_header(text: &str) -> Result<ForHeader, SyntaxError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
    };
    let item = parser.ident()?;
    let index = if parser.eat(",") {
        Some(parser.ident()?)
    } else {
        None
    };
    if index.as_deref() == Some(item.as_str()) {
        return Err(SyntaxError::new(
            format!("item and index cannot share the name '{item}'"),
            0,
        ));
    }
    let mode = match parser.ident() {
        Ok(kw) if kw == "of" => IterMode::Of,
        Ok(kw) if kw == "in" => IterMode::In,
        _ => {
            return Err(SyntaxError::new(
                "expected 'of' or 'in'",
                parser.current().offset,
            ))
        }
    };
    if mode == IterMode::In && index.is_some() {
        return Err(SyntaxError::new("'in' loops take a single binding", 0));
    }
    let iterable = parser.ternary()?;
    match parser.current().tok {
        Tok::Eof => Ok(ForHeader {
            item,
            index,
            mode,
            iterable,
        }),
        _ => Err(SyntaxError::new(
            "unexpected trailing tokens",
            parser.current().offset,
        )),
    }
}

/// Evaluate an expression against a scope.
pub fn eval(expr: &Expr, scope: &Scope) -> Result<Value, String> {
    match expr {
        Expr::Null => Ok(Value::Null),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(i) => Ok(Value::Int(*i)),
        Expr::Float(f) => Ok(Value::Float(*f)),
        Expr::Str(s) => Ok(Value::String(s.clone())),
        Expr::Ident(name) => scope.resolve(name).cloned(),
        Expr::Member(target, name) => member(&eval(target, scope)?, name),
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            index_value(&target, &index)
        }
        Expr::Call(target, name, args) => {
            let target = eval(target, scope)?;
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call(&target, name, &args)
        }
        Expr::Unary(op, inner) => {
            let value = eval(inner, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnaryOp::Neg => match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    other => Err(format!("cannot negate a {}", other.type_name())),
                },
            }
        }
        Expr::Binary(op, lhs, rhs) => binary(*op, lhs, rhs, scope),
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, scope)?.is_truthy() {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
    }
}

fn member(target: &Value, name: &str) -> Result<Value, String> {
    match target {
        Value::Object(obj) => obj
            .get(name)
            .cloned()
            .ok_or_else(|| format!("property '{name}' is undefined")),
        Value::String(s) if name == "length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::Array(arr) if name == "length" => Ok(Value::Int(arr.len() as i64)),
        other => Err(format!(
            "cannot access property '{name}' on a {}",
            other.type_name()
        )),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, String> {
    match (target, index) {
        (Value::Array(arr), Value::Int(i)) => {
            if *i < 0 || *i as usize >= arr.len() {
                Err(format!("index {i} out of bounds"))
            } else {
                Ok(arr[*i as usize].clone())
            }
        }
        (Value::Object(obj), Value::String(key)) => obj
            .get(key)
            .cloned()
            .ok_or_else(|| format!("property '{key}' is undefined")),
        (Value::String(s), Value::Int(i)) => s
            .chars()
            .nth(*i as usize)
            .map(|c| Value::String(c.to_string()))
            .ok_or_else(|| format!("index {i} out of bounds")),
        (t, i) => Err(format!(
            "cannot index a {} with a {}",
            t.type_name(),
            i.type_name()
        )),
    }
}

fn call(target: &Value, name: &str, args: &[Value]) -> Result<Value, String> {
    match (target, name) {
        (Value::String(s), "upper") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "lower") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "trim") => Ok(Value::String(s.trim().to_owned())),
        (Value::Array(arr), "join") => {
            let sep = match args.first() {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.stringify()?,
                None => ",".to_owned(),
            };
            let parts = arr
                .iter()
                .map(Value::stringify)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(parts.join(&sep)))
        }
        (other, _) => Err(format!(
            "'{name}' is not a function on a {}",
            other.type_name()
        )),
    }
}

fn binary(op: BinOp, lhs: &Expr, rhs: &Expr, scope: &Scope) -> Result<Value, String> {
    if op == BinOp::And {
        let left = eval(lhs, scope)?;
        return if left.is_truthy() { eval(rhs, scope) } else { Ok(left) };
    }
    if op == BinOp::Or {
        let left = eval(lhs, scope)?;
        return if left.is_truthy() { Ok(left) } else { eval(rhs, scope) };
    }
    let left = eval(lhs, scope)?;
    let right = eval(rhs, scope)?;
    match op {
        BinOp::Add => add(&left, &right),
        BinOp::Sub => arith(&left, &right, "-", |a, b| a - b, i64::checked_sub),
        BinOp::Mul => arith(&left, &right, "*", |a, b| a * b, i64::checked_mul),
        BinOp::Div => div(&left, &right),
        BinOp::Rem => rem(&left, &right),
        BinOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinOp::Lt => compare(&left, &right, |o| o == std::cmp::Ordering::Less),
        BinOp::Le => compare(&left, &right, |o| o != std::cmp::Ordering::Greater),
        BinOp::Gt => compare(&left, &right, |o| o == std::cmp::Ordering::Greater),
        BinOp::Ge => compare(&left, &right, |o| o != std::cmp::Ordering::Less),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn add(left: &Value, right: &Value) -> Result<Value, String> {
    if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
        let mut s = left.stringify()?;
        s.push_str(&right.stringify()?);
        return Ok(Value::String(s));
    }
    arith(left, right, "+", |a, b| a + b, i64::checked_add)
}

fn arith(
    left: &Value,
    right: &Value,
    op: &str,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> Result<Value, String> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(*a, *b)
            .map(Value::Int)
            .ok_or_else(|| format!("integer overflow in '{op}'")),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a, b))),
            _ => Err(format!(
                "cannot apply '{op}' to {} and {}",
                left.type_name(),
                right.type_name()
            )),
        },
    }
}

fn div(left: &Value, right: &Value) -> Result<Value, String> {
    match (left.as_f64(), right.as_f64()) {
        (Some(_), Some(b)) if b == 0.0 => Err("division by zero".to_owned()),
        (Some(a), Some(b)) => {
            let q = a / b;
            if q.fract() == 0.0 && q.abs() < 1e15 {
                Ok(Value::Int(q as i64))
            } else {
                Ok(Value::Float(q))
            }
        }
        _ => Err(format!(
            "cannot apply '/' to {} and {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

fn rem(left: &Value, right: &Value) -> Result<Value, String> {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err("division by zero".to_owned()),
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a % b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(a % b)),
            _ => Err(format!(
                "cannot apply '%' to {} and {}",
                left.type_name(),
                right.type_name()
            )),
        },
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(
    left: &Value,
    right: &Value,
    check: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, String> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match ordering {
        Some(o) => Ok(Value::Bool(check(o))),
        None => Err(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        )),
    }
}

/// Bindings produced for one loop iteration.
pub fn loop_bindings(
    header: &ForHeader,
    item: Value,
    position: usize,
) -> HashMap<String, Value> {
    let mut bindings = HashMap::new();
    bindings.insert(header.item.clone(), item);
    if let Some(index) = &header.index {
        bindings.insert(index.clone(), Value::Int(position as i64));
    }
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope(data: serde_json::Value) -> Scope {
        Scope::new(Value::from_json(&data)).unwrap()
    }

    fn run(text: &str, data: serde_json::Value) -> Result<Value, String> {
        let expr = parse(text).map_err(|e| e.message.clone())?;
        eval(&expr, &scope(data))
    }

    #[test]
    fn test_literals() {
        assert_eq!(run("42", json!({})).unwrap(), Value::Int(42));
        assert_eq!(run("1.5", json!({})).unwrap(), Value::Float(1.5));
        assert_eq!(
            run("'hi'", json!({})).unwrap(),
            Value::String("hi".to_owned())
        );
        assert_eq!(run("true", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("null", json!({})).unwrap(), Value::Null);
    }

    #[test]
    fn test_three_quote_kinds() {
        assert_eq!(run("\"a\"", json!({})).unwrap(), Value::String("a".to_owned()));
        assert_eq!(run("'a'", json!({})).unwrap(), Value::String("a".to_owned()));
        assert_eq!(run("`a`", json!({})).unwrap(), Value::String("a".to_owned()));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            run(r"'a\'b'", json!({})).unwrap(),
            Value::String("a'b".to_owned())
        );
        assert_eq!(
            run(r"'a\nb'", json!({})).unwrap(),
            Value::String("a\nb".to_owned())
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(
            run("user.profile.name", json!({"user": {"profile": {"name": "Ada"}}})).unwrap(),
            Value::String("Ada".to_owned())
        );
    }

    #[test]
    fn test_string_concat() {
        assert_eq!(
            run("a + '1'", json!({"a": "x"})).unwrap(),
            Value::String("x1".to_owned())
        );
        assert_eq!(
            run("'n=' + n", json!({"n": 5})).unwrap(),
            Value::String("n=5".to_owned())
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(run("2 + 3 * 4", json!({})).unwrap(), Value::Int(14));
        assert_eq!(run("(2 + 3) * 4", json!({})).unwrap(), Value::Int(20));
        assert_eq!(run("7 % 3", json!({})).unwrap(), Value::Int(1));
        assert_eq!(run("3 / 2", json!({})).unwrap(), Value::Float(1.5));
        assert_eq!(run("4 / 2", json!({})).unwrap(), Value::Int(2));
        assert_eq!(run("-n", json!({"n": 3})).unwrap(), Value::Int(-3));
        assert!(run("1 / 0", json!({})).is_err());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run("1 < 2", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("2 <= 2", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("'a' < 'b'", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("1 == 1.0", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("'a' == 'a'", json!({})).unwrap(), Value::Bool(true));
        assert_eq!(run("'a' != 1", json!({})).unwrap(), Value::Bool(true));
        assert!(run("'a' < 1", json!({})).is_err());
    }

    #[test]
    fn test_logic() {
        assert_eq!(run("!x", json!({"x": 0})).unwrap(), Value::Bool(true));
        assert_eq!(
            run("x || 'fallback'", json!({"x": ""})).unwrap(),
            Value::String("fallback".to_owned())
        );
        assert_eq!(
            run("x && y", json!({"x": 1, "y": 2})).unwrap(),
            Value::Int(2)
        );
        // short circuit skips evaluation of the right side
        assert_eq!(
            run("x && missing", json!({"x": 0})).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            run("cond ? 'js' : 'json'", json!({"cond": true})).unwrap(),
            Value::String("js".to_owned())
        );
        assert_eq!(
            run("cond ? 'js' : 'json'", json!({"cond": false})).unwrap(),
            Value::String("json".to_owned())
        );
    }

    #[test]
    fn test_index_access() {
        assert_eq!(
            run("items[1]", json!({"items": ["a", "b"]})).unwrap(),
            Value::String("b".to_owned())
        );
        assert_eq!(
            run("map['k']", json!({"map": {"k": 9}})).unwrap(),
            Value::Int(9)
        );
        assert!(run("items[5]", json!({"items": []})).is_err());
    }

    #[test]
    fn test_builtin_methods() {
        assert_eq!(
            run("name.upper()", json!({"name": "ada"})).unwrap(),
            Value::String("ADA".to_owned())
        );
        assert_eq!(
            run("name.lower()", json!({"name": "ADA"})).unwrap(),
            Value::String("ada".to_owned())
        );
        assert_eq!(
            run("name.trim()", json!({"name": " x "})).unwrap(),
            Value::String("x".to_owned())
        );
        assert_eq!(
            run("items.join('-')", json!({"items": [1, 2]})).unwrap(),
            Value::String("1-2".to_owned())
        );
        assert_eq!(
            run("name.length", json!({"name": "ada"})).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            run("items.length", json!({"items": [1]})).unwrap(),
            Value::Int(1)
        );
        assert!(run("n.upper()", json!({"n": 1})).is_err());
    }

    #[test]
    fn test_missing_names_fail() {
        assert!(run("missing", json!({})).is_err());
        assert!(run("user.missing", json!({"user": {}})).is_err());
    }

    #[test]
    fn test_syntax_errors_carry_offsets() {
        let err = parse("a + ").unwrap_err();
        assert_eq!(err.offset, 4);
        let err = parse("this is ] bad").unwrap_err();
        assert!(err.offset > 0);
        assert!(parse("1 ]").is_err());
        assert!(parse("'unterminated").is_err());
    }

    #[test]
    fn test_for_header_of() {
        let h = parse_for_header("item of items").unwrap();
        assert_eq!(h.item, "item");
        assert_eq!(h.index, None);
        assert_eq!(h.mode, IterMode::Of);
        assert_eq!(h.iterable, Expr::Ident("items".to_owned()));
    }

    #[test]
    fn test_for_header_with_index() {
        let h = parse_for_header("item, i of list.entries").unwrap();
        assert_eq!(h.index.as_deref(), Some("i"));
    }

    #[test]
    fn test_for_header_in() {
        let h = parse_for_header("key in map").unwrap();
        assert_eq!(h.mode, IterMode::In);
    }

    #[test]
    fn test_for_header_errors() {
        assert!(parse_for_header("item items").is_err());
        assert!(parse_for_header("x, x of items").is_err());
        assert!(parse_for_header("k, i in map").is_err());
        assert!(parse_for_header("of items").is_err());
    }
}
