//! Evaluation of expressions against tag values.
//!
//! A condition is three-valued: it holds, it does not hold, or it cannot be
//! decided because the tag is missing or its value does not coerce to the
//! operand's type. Undecided results propagate as follows:
//!
//! | expression | result                                             |
//! |------------|----------------------------------------------------|
//! | `NOT x`    | undecided if `x` is                                |
//! | `x AND y`  | undecided if either side is                        |
//! | `x OR y`   | the decided side; undecided only if both sides are |
//!
//! A query whose overall result is undecided does not match.

use std::cmp::Ordering;

use thiserror::Error;

use crate::error::QueryError;
use crate::tags::Tagged;
use crate::value::TagValue;

use super::ast::{Condition, Expr, Operand, Operator};
use super::parser::{self, Op, QueryListener};

/// Why a condition could not be decided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Undecided {
    #[error("tag '{0}' is not present")]
    MissingTag(String),

    #[error("tag '{tag}' cannot be compared: {reason}")]
    Incomparable { tag: String, reason: String },
}

/// Result of evaluating an expression.
pub type Outcome = Result<bool, Undecided>;

/// Evaluates `expr`, looking tag values up through `resolve`.
///
/// Both sides of `AND` and `OR` are always evaluated.
pub fn evaluate<F>(expr: &Expr, resolve: &F) -> Outcome
where
    F: Fn(&str) -> Option<TagValue> + ?Sized,
{
    match expr {
        Expr::Condition(cond) => eval_condition(cond, resolve(&cond.tag)),
        Expr::Not(inner) => evaluate(inner, resolve).map(|b| !b),
        Expr::And(left, right) => and(evaluate(left, resolve), evaluate(right, resolve)),
        Expr::Or(left, right) => or(evaluate(left, resolve), evaluate(right, resolve)),
    }
}

/// Evaluates a single condition against the tag's value, if any.
pub fn eval_condition(cond: &Condition, value: Option<TagValue>) -> Outcome {
    let value = value.ok_or_else(|| Undecided::MissingTag(cond.tag.clone()))?;
    compare(&value, cond.op, &cond.operand).map_err(|reason| Undecided::Incomparable {
        tag: cond.tag.clone(),
        reason,
    })
}

fn and(left: Outcome, right: Outcome) -> Outcome {
    Ok(left? && right?)
}

fn or(left: Outcome, right: Outcome) -> Outcome {
    match (left, right) {
        (Ok(a), Ok(b)) => Ok(a || b),
        (Ok(a), Err(_)) | (Err(_), Ok(a)) => Ok(a),
        (Err(e), Err(_)) => Err(e),
    }
}

/// Compares a tag value with an operand.
///
/// A list value holds if any element does; it is undecided only when every
/// element is.
fn compare(value: &TagValue, op: Operator, operand: &Operand) -> Result<bool, String> {
    match value {
        TagValue::List(items) if !items.is_empty() => {
            let mut first_err = None;
            let mut decided = false;
            for item in items {
                match compare(item, op, operand) {
                    Ok(true) => return Ok(true),
                    Ok(false) => decided = true,
                    Err(e) => {
                        first_err.get_or_insert(e);
                    }
                }
            }
            match first_err {
                Some(e) if !decided => Err(e),
                _ => Ok(false),
            }
        }
        _ => compare_scalar(value, op, operand),
    }
}

fn compare_scalar(value: &TagValue, op: Operator, operand: &Operand) -> Result<bool, String> {
    match operand {
        Operand::String(expected) => {
            let actual = value.to_string();
            match op {
                Operator::Equal => Ok(actual == *expected),
                Operator::NotEqual => Ok(actual != *expected),
                Operator::Contains => Ok(actual.contains(expected.as_str())),
                _ => Err(format!("operator {op} cannot be applied to a string")),
            }
        }
        Operand::Bool(expected) => {
            let actual = value.to_string();
            let expected = if *expected { "true" } else { "false" };
            match op {
                Operator::Equal => Ok(actual == expected),
                Operator::NotEqual => Ok(actual != expected),
                _ => Err(format!("operator {op} cannot be applied to a boolean")),
            }
        }
        Operand::Number(expected) => {
            let actual = value
                .to_numeric()
                .ok_or_else(|| format!("value '{value}' is not a number"))?;
            let ordering = actual
                .compare(expected.to_numeric())
                .ok_or_else(|| format!("value '{value}' is not comparable with {expected}"))?;
            apply(op, ordering)
        }
        Operand::Time(expected) => {
            let actual = value
                .to_time()
                .ok_or_else(|| format!("value '{value}' is not an RFC3339 time"))?;
            apply(op, actual.cmp(expected))
        }
        Operand::Date(expected) => {
            let actual = value
                .to_date()
                .ok_or_else(|| format!("value '{value}' is not a date"))?;
            apply(op, actual.cmp(expected))
        }
    }
}

fn apply(op: Operator, ordering: Ordering) -> Result<bool, String> {
    match op {
        Operator::Equal => Ok(ordering == Ordering::Equal),
        Operator::NotEqual => Ok(ordering != Ordering::Equal),
        Operator::Less => Ok(ordering == Ordering::Less),
        Operator::LessEqual => Ok(ordering != Ordering::Greater),
        Operator::Greater => Ok(ordering == Ordering::Greater),
        Operator::GreaterEqual => Ok(ordering != Ordering::Less),
        Operator::Contains => Err("CONTAINS requires a quoted string".to_string()),
    }
}

/// Evaluates parse events directly against a tag set, without building a tree.
pub struct MatchListener<'t> {
    tags: &'t dyn Tagged,
    tag: Option<String>,
    operand: Option<Operand>,
    stack: Vec<Outcome>,
    malformed: bool,
}

impl<'t> MatchListener<'t> {
    #[must_use]
    pub fn new(tags: &'t dyn Tagged) -> Self {
        Self {
            tags,
            tag: None,
            operand: None,
            stack: Vec::new(),
            malformed: false,
        }
    }

    /// The outcome of the whole query, or `None` if the events did not form
    /// a single expression.
    #[must_use]
    pub fn finish(mut self) -> Option<Outcome> {
        if self.malformed || self.stack.len() != 1 {
            return None;
        }
        self.stack.pop()
    }

    fn pop2(&mut self) -> Option<(Outcome, Outcome)> {
        let right = self.stack.pop()?;
        let left = self.stack.pop()?;
        Some((left, right))
    }
}

impl QueryListener for MatchListener<'_> {
    fn tag(&mut self, tag: &str) {
        self.tag = Some(tag.to_string());
    }

    fn operand(&mut self, operand: Operand) {
        self.operand = Some(operand);
    }

    fn operator(&mut self, op: Op) {
        let outcome = match op {
            Op::Compare(op) => match (self.tag.take(), self.operand.take()) {
                (Some(tag), Some(operand)) => {
                    let value = self.tags.get(&tag);
                    Some(eval_condition(&Condition { tag, op, operand }, value))
                }
                _ => None,
            },
            Op::And => self.pop2().map(|(l, r)| and(l, r)),
            Op::Or => self.pop2().map(|(l, r)| or(l, r)),
            Op::Not => self.stack.pop().map(|o| o.map(|b| !b)),
        };
        match outcome {
            Some(outcome) => self.stack.push(outcome),
            None => self.malformed = true,
        }
    }
}

/// Parses `query` and matches it against `tags` in a single pass.
///
/// # Errors
///
/// Returns `QueryError::Parse` on malformed query text.
pub fn match_text(query: &str, tags: &dyn Tagged) -> Result<bool, QueryError> {
    let mut listener = MatchListener::new(tags);
    parser::parse_with(query, &mut listener)?;
    Ok(matches!(listener.finish(), Some(Ok(true))))
}
