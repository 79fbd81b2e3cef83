//! Calculator tool: evaluates arithmetic expressions.
//!
//! Grammar (recursive descent, lowest precedence first):
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/' | '%') unary)*
//! unary   = '-' unary | power
//! power   = primary ('^' unary)?
//! primary = NUMBER | '(' expr ')'
//! ```
//!
//! Nesting through parentheses, unary minus and `^` chains is capped at [`MAX_DEPTH`].

use async_trait::async_trait;
use operative_core::error::ToolError;
use operative_core::tool::{Tool, ToolOutput};
use std::iter::Peekable;
use std::str::CharIndices;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, and decimals. \
         ^ is right-associative and binds tighter than unary minus, so -2^2 is -4."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let expr = arguments["expression"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;
        Ok(ToolOutput::text(format_number(value)))
    }
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar { found: char, offset: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("missing closing parenthesis")]
    UnclosedParen,

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NotFinite,

    #[error("expression nested deeper than {MAX_DEPTH} levels")]
    TooDeep,
}

/// Maximum nesting of parentheses, unary minus and `^` chains.
pub const MAX_DEPTH: usize = 256;

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, CalcError> {
    let mut parser = Parser {
        chars: expr.char_indices().peekable(),
        source: expr,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if let Some((offset, found)) = parser.chars.next() {
        return Err(CalcError::UnexpectedChar { found, offset });
    }
    if !value.is_finite() {
        return Err(CalcError::NotFinite);
    }
    Ok(value)
}

/// Integers print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

struct Parser<'a> {
    chars: Peekable<CharIndices<'a>>,
    source: &'a str,
    depth: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, want: char) -> bool {
        self.skip_ws();
        self.chars.next_if(|&(_, c)| c == want).is_some()
    }

    fn descend(&mut self) -> Result<(), CalcError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(CalcError::TooDeep);
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc += self.term()?;
            } else if self.eat('-') {
                acc -= self.term()?;
            } else {
                return Ok(acc);
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut acc = self.unary()?;
        loop {
            if self.eat('*') {
                acc *= self.unary()?;
            } else if self.eat('/') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                acc /= rhs;
            } else if self.eat('%') {
                let rhs = self.unary()?;
                if rhs == 0.0 {
                    return Err(CalcError::DivisionByZero);
                }
                acc %= rhs;
            } else {
                return Ok(acc);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        if self.eat('-') {
            self.descend()?;
            let value = -self.unary()?;
            self.depth -= 1;
            return Ok(value);
        }
        self.power()
    }

    // Right-associative: 2^3^2 == 2^9. The exponent may carry its own sign.
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.primary()?;
        if self.eat('^') {
            self.descend()?;
            let exp = self.unary()?;
            self.depth -= 1;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        if self.eat('(') {
            self.descend()?;
            let inner = self.expr()?;
            if !self.eat(')') {
                return Err(CalcError::UnclosedParen);
            }
            self.depth -= 1;
            return Ok(inner);
        }

        self.skip_ws();
        let (start, first) = self.chars.peek().copied().ok_or(CalcError::UnexpectedEnd)?;
        if !(first.is_ascii_digit() || first == '.') {
            return Err(CalcError::UnexpectedChar {
                found: first,
                offset: start,
            });
        }

        let mut end = start;
        while let Some((i, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.') {
            end = i + c.len_utf8();
        }
        let literal = &self.source[start..end];
        literal
            .parse()
            .map_err(|_| CalcError::InvalidNumber(literal.to_string()))
    }
}
