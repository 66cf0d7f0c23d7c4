//! # Arithmetic Evaluator
//!
//! Recursive-descent evaluator for the calculator cell. Only numbers,
//! parentheses and `+ - * / // **` exist in this language; there is nothing
//! else an expression could reach.
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/' | '//') unary)*
//! unary  := ('+' | '-') unary | power
//! power  := atom ('**' unary)?
//! atom   := NUMBER | '(' expr ')'
//! ```
//!
//! `**` is right-associative and binds tighter than a unary sign on its left
//! (`-2**2 == -4`), but its right operand may carry a sign (`2**-1 == 0.5`).
//! `/` always yields a float; `//` floors.
//!
//! Nesting (parentheses, signs, exponents) is capped at [`MAX_DEPTH`] so a
//! hostile expression cannot exhaust the stack.

use std::fmt;
use thiserror::Error;

/// Characters that survive sanitization.
pub const ALLOWED_CHARS: &str = "0123456789+-*/.() ";

/// Deepest accepted nesting of parentheses, unary signs and exponents.
pub const MAX_DEPTH: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArithError {
    #[error("empty expression")]
    Empty,

    #[error("invalid syntax at position {0}")]
    Syntax(usize),

    #[error("invalid number '{0}'")]
    Number(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("math domain error")]
    Domain,

    #[error("numerical result out of range")]
    OutOfRange,

    #[error("expression nested too deeply (limit {MAX_DEPTH})")]
    TooDeep,
}

/// Evaluation result; integers stay exact until a float enters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Float(f) => f,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Self::Int(i) => i == 0,
            Self::Float(f) => f == 0.0,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&format_float(*x)),
        }
    }
}

/// Drop every character outside [`ALLOWED_CHARS`].
#[must_use]
pub fn sanitize(expression: &str) -> String {
    expression
        .chars()
        .filter(|c| ALLOWED_CHARS.contains(*c))
        .collect()
}

/// Evaluate an already sanitized expression.
pub fn evaluate(expression: &str) -> Result<Number, ArithError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(ArithError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    match parser.peek() {
        None => Ok(value),
        Some(_) => Err(ArithError::Syntax(parser.pos)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Num(Number),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    DoubleStar,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ArithError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' => {}
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '*' if next == Some('*') => {
                tokens.push(Token::DoubleStar);
                i += 1;
            }
            '*' => tokens.push(Token::Star),
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 1;
            }
            '/' => tokens.push(Token::Slash),
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                tokens.push(Token::Num(parse_number(&literal)?));
                continue;
            }
            _ => return Err(ArithError::Syntax(i)),
        }
        i += 1;
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Number, ArithError> {
    let invalid = || ArithError::Number(literal.to_string());
    match literal.matches('.').count() {
        0 => literal
            .parse::<i128>()
            .map(Number::Int)
            .map_err(|_| ArithError::Overflow),
        1 if literal != "." => literal.parse::<f64>().map(Number::Float).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Number, ArithError> {
        let mut left = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let right = self.term()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Number, ArithError> {
        let mut left = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash | Token::DoubleSlash)) = self.peek() {
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right)?;
        }
        Ok(left)
    }

    // Every recursive path (parenthesis, sign, exponent) passes through here.
    fn unary(&mut self) -> Result<Number, ArithError> {
        if self.depth >= MAX_DEPTH {
            return Err(ArithError::TooDeep);
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<Number, ArithError> {
        match self.peek() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                negate(self.unary()?)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Number, ArithError> {
        let base = self.atom()?;
        if self.peek() == Some(Token::DoubleStar) {
            self.pos += 1;
            let exponent = self.unary()?;
            return pow(base, exponent);
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, ArithError> {
        let at = self.pos;
        match self.advance() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(ArithError::Syntax(self.pos - 1)),
                }
            }
            _ => Err(ArithError::Syntax(at)),
        }
    }
}

fn negate(n: Number) -> Result<Number, ArithError> {
    match n {
        Number::Int(i) => i.checked_neg().map(Number::Int).ok_or(ArithError::Overflow),
        Number::Float(f) => Ok(Number::Float(-f)),
    }
}

fn binary(op: Token, left: Number, right: Number) -> Result<Number, ArithError> {
    use Number::Int;

    match (op, left, right) {
        (Token::Slash, _, r) if r.is_zero() => Err(ArithError::DivisionByZero),
        (Token::DoubleSlash, _, r) if r.is_zero() => Err(ArithError::DivisionByZero),

        (Token::Plus, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or(ArithError::Overflow),
        (Token::Minus, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or(ArithError::Overflow),
        (Token::Star, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or(ArithError::Overflow),
        (Token::DoubleSlash, Int(a), Int(b)) => floor_div(a, b).map(Int),

        (Token::Plus, a, b) => finite(a.as_f64() + b.as_f64()),
        (Token::Minus, a, b) => finite(a.as_f64() - b.as_f64()),
        (Token::Star, a, b) => finite(a.as_f64() * b.as_f64()),
        (Token::Slash, a, b) => finite(a.as_f64() / b.as_f64()),
        (Token::DoubleSlash, a, b) => finite((a.as_f64() / b.as_f64()).floor()),

        _ => Err(ArithError::Syntax(0)),
    }
}

fn floor_div(a: i128, b: i128) -> Result<i128, ArithError> {
    let q = a.checked_div(b).ok_or(ArithError::Overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn pow(base: Number, exponent: Number) -> Result<Number, ArithError> {
    if let (Number::Int(b), Number::Int(e)) = (base, exponent) {
        if e >= 0 {
            let e = u32::try_from(e).map_err(|_| ArithError::Overflow)?;
            return b.checked_pow(e).map(Number::Int).ok_or(ArithError::Overflow);
        }
    }

    let (b, e) = (base.as_f64(), exponent.as_f64());
    if b == 0.0 && e < 0.0 {
        return Err(ArithError::DivisionByZero);
    }
    if b < 0.0 && e.fract() != 0.0 {
        return Err(ArithError::Domain);
    }
    finite(b.powf(e))
}

fn finite(value: f64) -> Result<Number, ArithError> {
    if value.is_finite() {
        Ok(Number::Float(value))
    } else {
        Err(ArithError::OutOfRange)
    }
}

/// Shortest round-trip float text, with `.0` on integral values and
/// scientific notation outside `1e-4..1e16`.
fn format_float(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{value:e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();

    if (-4..16).contains(&exponent) {
        let plain = format!("{value}");
        if plain.contains('.') {
            plain
        } else {
            format!("{plain}.0")
        }
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str) -> String {
        evaluate(&sanitize(expression)).unwrap().to_string()
    }

    fn eval_err(expression: &str) -> ArithError {
        evaluate(&sanitize(expression)).unwrap_err()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("2*3+4"), "10");
        assert_eq!(eval("2+3*4"), "14");
        assert_eq!(eval("(2+3)*4"), "20");
        assert_eq!(eval("10 - 4 - 3"), "3");
    }

    #[test]
    fn test_true_and_floor_division() {
        assert_eq!(eval("10/4"), "2.5");
        assert_eq!(eval("4/2"), "2.0");
        assert_eq!(eval("7//2"), "3");
        assert_eq!(eval("-7//2"), "-4");
        assert_eq!(eval("7.5//2"), "3.0");
    }

    #[test]
    fn test_power() {
        assert_eq!(eval("2**10"), "1024");
        assert_eq!(eval("2**3**2"), "512");
        assert_eq!(eval("-2**2"), "-4");
        assert_eq!(eval("2**-1"), "0.5");
        assert_eq!(eval("4**0.5"), "2.0");
    }

    #[test]
    fn test_unary_signs() {
        assert_eq!(eval("-3+5"), "2");
        assert_eq!(eval("--3"), "3");
        assert_eq!(eval("+-+3"), "-3");
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(eval("0.1+0.2"), "0.30000000000000004");
        assert_eq!(eval("1.5*2"), "3.0");
        assert_eq!(eval("10.0**16"), "1e+16");
        assert_eq!(eval("1/100000"), "1e-05");
        assert_eq!(eval("1/10000"), "0.0001");
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval_err("1/0"), ArithError::DivisionByZero);
        assert_eq!(eval_err("1//0.0"), ArithError::DivisionByZero);
        assert_eq!(eval_err("0**-1"), ArithError::DivisionByZero);
        assert_eq!(eval_err("(-8)**0.5"), ArithError::Domain);
        assert_eq!(eval_err("10**100"), ArithError::Overflow);
        assert_eq!(eval_err("1.2.3"), ArithError::Number("1.2.3".into()));
        assert!(matches!(eval_err("(1+2"), ArithError::Syntax(_)));
        assert!(matches!(eval_err("1 2"), ArithError::Syntax(_)));
        assert!(matches!(eval_err("()"), ArithError::Syntax(_)));
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(evaluate(&deep), Err(ArithError::TooDeep));
        assert_eq!(evaluate(&format!("{}1", "-".repeat(10_000))), Err(ArithError::TooDeep));
        assert_eq!(evaluate(&vec!["2"; 5_000].join("**")), Err(ArithError::TooDeep));

        let shallow = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow), "1");
    }

    #[test]
    fn test_sanitized_code_is_inert() {
        assert_eq!(sanitize("import os"), "  ");
        assert_eq!(eval_err("import os"), ArithError::Empty);
        assert_eq!(sanitize("__import__('os').system('ls')"), "().()");
        assert!(evaluate(&sanitize("__import__('os').system('ls')")).is_err());
        assert!(evaluate(&sanitize("2*3+4; rm -rf /")).is_err());
    }
}
