//! Recursive-descent parser for the query language.
//!
//! ```text
//! expr      := and ( OR and )*
//! and       := unary ( AND unary )*
//! unary     := [NOT] condition
//! condition := tag op operand | '(' expr ')'
//! op        := '<=' | '>=' | '<' | '>' | '=' | '!=' | CONTAINS
//! operand   := number | TIME yyyy-mm-ddThh:mm:ss(Z|±hh:mm) | DATE yyyy-mm-dd
//!            | 'quoted' | true | false
//! ```
//!
//! Keywords are case-insensitive. The parser does not build a tree itself:
//! it reports tags, operands and operators to a [`QueryListener`] in postfix
//! order (`a = 1 AND b = 2` yields `a`, `1`, `=`, `b`, `2`, `=`, `AND`), so
//! a listener can assemble an [`Expr`] ([`ExprBuilder`]) or evaluate the
//! query in the same pass.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

use crate::error::QueryError;

use super::ast::{Condition, Expr, Number, Operand, Operator};

/// Operators reported to a [`QueryListener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    Not,
    Compare(Operator),
}

/// Receives parse events in postfix order.
pub trait QueryListener {
    fn tag(&mut self, tag: &str);
    fn operand(&mut self, operand: Operand);
    fn operator(&mut self, op: Op);
}

/// Parses `input`, reporting every element to `listener`.
///
/// # Errors
///
/// Returns `QueryError::Parse` carrying the line and column of the first
/// offending character.
pub fn parse_with<L: QueryListener + ?Sized>(input: &str, listener: &mut L) -> Result<(), QueryError> {
    let mut parser = Parser {
        input,
        pos: 0,
        listener,
    };
    parser.skip_ws();
    parser.expr()?;
    parser.skip_ws();
    if parser.pos < input.len() {
        return Err(parser.error("unexpected input, expected AND, OR or end of query"));
    }
    Ok(())
}

/// Parses `input` into an expression tree.
///
/// # Errors
///
/// Returns `QueryError::Parse` on malformed input.
pub fn parse_expr(input: &str) -> Result<Expr, QueryError> {
    let mut builder = ExprBuilder::default();
    parse_with(input, &mut builder)?;
    builder.finish().ok_or_else(|| QueryError::Parse {
        line: 1,
        column: 1,
        near: input.to_string(),
        message: "incomplete expression".to_string(),
    })
}

/// Assembles parse events into an [`Expr`] with an operand stack.
#[derive(Debug, Default)]
pub struct ExprBuilder {
    stack: Vec<Expr>,
    tag: Option<String>,
    operand: Option<Operand>,
    malformed: bool,
}

impl ExprBuilder {
    /// The finished tree, or `None` if the event sequence was not a single
    /// well-formed expression.
    #[must_use]
    pub fn finish(mut self) -> Option<Expr> {
        if self.malformed || self.stack.len() != 1 {
            return None;
        }
        self.stack.pop()
    }

    fn pop2(&mut self) -> Option<(Expr, Expr)> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;
        Some((left, right))
    }
}

impl QueryListener for ExprBuilder {
    fn tag(&mut self, tag: &str) {
        self.tag = Some(tag.to_string());
    }

    fn operand(&mut self, operand: Operand) {
        self.operand = Some(operand);
    }

    fn operator(&mut self, op: Op) {
        let built = match op {
            Op::Compare(op) => match (self.tag.take(), self.operand.take()) {
                (Some(tag), Some(operand)) => Some(Expr::Condition(Condition { tag, op, operand })),
                _ => None,
            },
            Op::And => self.pop2().map(|(l, r)| Expr::and(l, r)),
            Op::Or => self.pop2().map(|(l, r)| Expr::or(l, r)),
            Op::Not => self.stack.pop().map(Expr::not),
        };
        match built {
            Some(expr) => self.stack.push(expr),
            None => self.malformed = true,
        }
    }
}

fn time_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[12][0-9]{3}-[01][0-9]-[0-3][0-9]T[0-9]{2}:[0-9]{2}:[0-9]{2}(?:Z|[-+][0-9]{2}:[0-9]{2})")
            .expect("time literal pattern is valid")
    })
}

fn date_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[12][0-9]{3}-[01][0-9]-[0-3][0-9]").expect("date literal pattern is valid"))
}

fn number_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:0|[1-9][0-9]*)(?:\.[0-9]*)?").expect("number literal pattern is valid"))
}

const fn is_tag_char(c: char) -> bool {
    !(c.is_ascii_whitespace()
        || matches!(c, '\\' | '(' | ')' | '"' | '\'' | '=' | '>' | '<' | '!'))
}

struct Parser<'a, 'l, L: ?Sized> {
    input: &'a str,
    pos: usize,
    listener: &'l mut L,
}

impl<'a, L: QueryListener + ?Sized> Parser<'a, '_, L> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn error(&self, message: &str) -> QueryError {
        self.error_at(self.pos, message)
    }

    fn error_at(&self, pos: usize, message: &str) -> QueryError {
        let before = &self.input[..pos];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        let near: String = self.input[pos..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(24)
            .collect();
        QueryError::Parse {
            line,
            column,
            near,
            message: message.to_string(),
        }
    }

    /// Consumes a case-insensitive keyword followed by whitespace or `(`.
    fn keyword(&mut self, kw: &str) -> bool {
        let rest = self.rest();
        let matches = rest.get(..kw.len()).is_some_and(|s| s.eq_ignore_ascii_case(kw));
        if !matches {
            return false;
        }
        match rest[kw.len()..].chars().next() {
            Some(c) if c.is_whitespace() || c == '(' => {
                self.pos += kw.len();
                self.skip_ws();
                true
            }
            _ => false,
        }
    }

    fn expr(&mut self) -> Result<(), QueryError> {
        self.and_expr()?;
        while self.keyword("OR") {
            self.and_expr()?;
            self.listener.operator(Op::Or);
        }
        Ok(())
    }

    fn and_expr(&mut self) -> Result<(), QueryError> {
        self.unary()?;
        while self.keyword("AND") {
            self.unary()?;
            self.listener.operator(Op::And);
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), QueryError> {
        if self.keyword("NOT") {
            self.condition()?;
            self.listener.operator(Op::Not);
            return Ok(());
        }
        self.condition()
    }

    fn condition(&mut self) -> Result<(), QueryError> {
        if self.peek() == Some('(') {
            self.pos += 1;
            self.skip_ws();
            self.expr()?;
            if self.peek() != Some(')') {
                return Err(self.error("expected ')'"));
            }
            self.pos += 1;
            self.skip_ws();
            return Ok(());
        }

        let tag = self.tag()?;
        self.listener.tag(tag);
        self.skip_ws();
        let op = self.operator()?;
        self.skip_ws();
        let operand = self.operand_for(op)?;
        self.listener.operand(operand);
        self.listener.operator(Op::Compare(op));
        self.skip_ws();
        Ok(())
    }

    fn tag(&mut self) -> Result<&'a str, QueryError> {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_tag_char(c)).unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected tag or '('"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn operator(&mut self) -> Result<Operator, QueryError> {
        const SYMBOLS: [(&str, Operator); 6] = [
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("!=", Operator::NotEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
            ("=", Operator::Equal),
        ];
        let rest = self.rest();
        for (symbol, op) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.pos += symbol.len();
                return Ok(op);
            }
        }
        let is_contains = rest.get(..8).is_some_and(|s| s.eq_ignore_ascii_case("CONTAINS"))
            && rest[8..].chars().next().is_some_and(|c| c.is_whitespace() || c == '\'');
        if is_contains {
            self.pos += 8;
            return Ok(Operator::Contains);
        }
        Err(self.error("expected operator (=, !=, <, <=, >, >=, CONTAINS)"))
    }

    fn operand_for(&mut self, op: Operator) -> Result<Operand, QueryError> {
        match op {
            Operator::Contains => self
                .quoted()?
                .ok_or_else(|| self.error("expected quoted value after CONTAINS")),
            Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
                if let Some(operand) = self.time()? {
                    return Ok(operand);
                }
                if let Some(operand) = self.date()? {
                    return Ok(operand);
                }
                self.number()?
                    .ok_or_else(|| self.error("expected number, TIME or DATE literal"))
            }
            Operator::Equal | Operator::NotEqual => {
                if let Some(operand) = self.time()? {
                    return Ok(operand);
                }
                if let Some(operand) = self.date()? {
                    return Ok(operand);
                }
                if let Some(operand) = self.quoted()? {
                    return Ok(operand);
                }
                if let Some(operand) = self.boolean() {
                    return Ok(operand);
                }
                self.number()?.ok_or_else(|| {
                    self.error("expected number, TIME or DATE literal, boolean or quoted value")
                })
            }
        }
    }

    fn quoted(&mut self) -> Result<Option<Operand>, QueryError> {
        if self.peek() != Some('\'') {
            return Ok(None);
        }
        let start = self.pos;
        let body = &self.rest()[1..];
        let Some(end) = body.find(['\'', '"']) else {
            return Err(self.error_at(start, "unterminated quoted value"));
        };
        if body[end..].starts_with('"') {
            return Err(self.error_at(start + 1 + end, "double quote inside quoted value"));
        }
        let value = body[..end].to_string();
        self.pos += end + 2;
        Ok(Some(Operand::String(value)))
    }

    fn boolean(&mut self) -> Option<Operand> {
        for (word, value) in [("true", true), ("false", false)] {
            let rest = self.rest();
            let matches = rest.get(..word.len()).is_some_and(|s| s.eq_ignore_ascii_case(word))
                && rest[word.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| c.is_whitespace() || c == ')');
            if matches {
                self.pos += word.len();
                return Some(Operand::Bool(value));
            }
        }
        None
    }

    /// Matches `KEYWORD ` (one space) and returns the literal text after it.
    fn prefixed_literal(&mut self, kw: &str, pattern: &Regex, what: &str) -> Result<Option<&'a str>, QueryError> {
        let rest = self.rest();
        let has_keyword = rest.get(..kw.len()).is_some_and(|s| s.eq_ignore_ascii_case(kw))
            && rest[kw.len()..].starts_with(' ');
        if !has_keyword {
            return Ok(None);
        }
        let literal_start = self.pos + kw.len() + 1;
        let Some(found) = pattern.find(&self.input[literal_start..]) else {
            return Err(self.error_at(literal_start, &format!("malformed {kw} literal, expected {what}")));
        };
        self.pos = literal_start + found.end();
        Ok(Some(found.as_str()))
    }

    fn time(&mut self) -> Result<Option<Operand>, QueryError> {
        let start = self.pos;
        let Some(text) = self.prefixed_literal("TIME", time_literal(), "YYYY-MM-DDThh:mm:ss followed by Z or ±hh:mm")? else {
            return Ok(None);
        };
        let time = DateTime::parse_from_rfc3339(text)
            .map_err(|e| self.error_at(start, &format!("invalid TIME literal: {e}")))?;
        Ok(Some(Operand::Time(time.with_timezone(&Utc))))
    }

    fn date(&mut self) -> Result<Option<Operand>, QueryError> {
        let start = self.pos;
        let Some(text) = self.prefixed_literal("DATE", date_literal(), "YYYY-MM-DD")? else {
            return Ok(None);
        };
        let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map_err(|e| self.error_at(start, &format!("invalid DATE literal: {e}")))?;
        Ok(Some(Operand::Date(date)))
    }

    fn number(&mut self) -> Result<Option<Operand>, QueryError> {
        let start = self.pos;
        let Some(found) = number_literal().find(self.rest()) else {
            return Ok(None);
        };
        let text = found.as_str();
        self.pos += found.end();
        let number = if text.contains('.') {
            None
        } else {
            text.parse::<u64>().ok().map(Number::Int)
        };
        let number = match number {
            Some(n) => n,
            None => text
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|e| self.error_at(start, &format!("invalid number: {e}")))?,
        };
        Ok(Some(Operand::Number(number)))
    }
}
