//! Compiled query expressions.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::value::{format_time, Numeric};

/// Comparison operators of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Contains,
}

impl Operator {
    /// Query-text spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Contains => "CONTAINS",
        }
    }

    /// True for `<`, `<=`, `>` and `>=`.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A numeric literal. The grammar has no sign, so literals are never negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(u64),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn to_numeric(self) -> Numeric {
        match self {
            Self::Int(v) => Numeric::Int(i128::from(v)),
            Self::Float(v) => Numeric::Float(v),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            // Keep a fractional part so the literal re-parses as a float.
            Self::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v}.0"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// The right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A quoted string.
    String(String),
    Number(Number),
    /// A `TIME` literal.
    Time(DateTime<Utc>),
    /// A `DATE` literal.
    Date(NaiveDate),
    /// Bare `true` / `false`.
    Bool(bool),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{s}'"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Time(t) => write!(f, "TIME {}", format_time(t)),
            Self::Date(d) => write!(f, "DATE {}", d.format("%Y-%m-%d")),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A single `tag operator operand` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub tag: String,
    pub op: Operator,
    pub operand: Operand,
}

impl Condition {
    #[must_use]
    pub fn new(tag: impl Into<String>, op: Operator, operand: Operand) -> Self {
        Self {
            tag: tag.into(),
            op,
            operand,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.tag, self.op, self.operand)
    }
}

/// Boolean expression tree over conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Condition(Condition),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

impl Expr {
    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Conditions in left-to-right order.
    #[must_use]
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::Condition(c) => out.push(c),
            Self::And(l, r) | Self::Or(l, r) => {
                l.collect_conditions(out);
                r.collect_conditions(out);
            }
            Self::Not(inner) => inner.collect_conditions(out),
        }
    }

    // OR binds loosest, then AND; NOT applies to a single condition.
    const fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Not(_) | Self::Condition(_) => 3,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, child: &Self, right: bool) -> fmt::Result {
        let parenthesize = child.precedence() < self.precedence()
            || (right && child.precedence() == self.precedence());
        if parenthesize {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(c) => write!(f, "{c}"),
            Self::And(l, r) => {
                self.fmt_child(f, l, false)?;
                f.write_str(" AND ")?;
                self.fmt_child(f, r, true)
            }
            Self::Or(l, r) => {
                self.fmt_child(f, l, false)?;
                f.write_str(" OR ")?;
                self.fmt_child(f, r, true)
            }
            Self::Not(inner) => match inner.as_ref() {
                Self::Condition(c) => write!(f, "NOT {c}"),
                other => write!(f, "NOT ({other})"),
            },
        }
    }
}
