//! The query language: parsing, evaluation and programmatic construction.
//!
//! ```
//! use chain_events::{Query, TagMap};
//!
//! let query = Query::parse("foo.size >= 45 AND bar.name = 'marmot'").unwrap();
//! let tags = TagMap::new().with("foo.size", 80u64).with("bar.name", "marmot");
//! assert!(query.matches(&tags));
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::tags::Tagged;
use crate::value::TagValue;

/// Expression tree types.
pub mod ast;
/// Query text construction.
pub mod builder;
/// Three-valued evaluation.
pub mod eval;
/// Query text parsing.
pub mod parser;

pub use ast::{Condition, Expr, Number, Operand, Operator};
pub use builder::{QueryArg, QueryBuilder};
pub use eval::{match_text, Outcome, Undecided};
pub use parser::{ExprBuilder, Op, QueryListener};

/// A compiled query.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Matches every tag set.
    Empty,
    Expr(Expr),
}

impl Query {
    /// Compiles query text. Blank text and `empty` compile to [`Query::Empty`].
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Parse` with the line and column of the first
    /// offending character.
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("empty") {
            return Ok(Self::Empty);
        }
        parser::parse_expr(text).map(Self::Expr)
    }

    /// Compiles query text known to be valid.
    ///
    /// # Panics
    ///
    /// Panics if `text` does not parse. Only use with literal query text.
    #[must_use]
    pub fn must_parse(text: &str) -> Self {
        match Self::parse(text) {
            Ok(query) => query,
            Err(e) => panic!("invalid query {text:?}: {e}"),
        }
    }

    /// True if every condition holds for `tags`. Undecided queries do not match.
    #[must_use]
    pub fn matches(&self, tags: &dyn Tagged) -> bool {
        self.matches_with(&|key| tags.get(key))
    }

    /// Like [`matches`](Self::matches), resolving tag values through a closure.
    pub fn matches_with<F>(&self, resolve: &F) -> bool
    where
        F: Fn(&str) -> Option<TagValue>,
    {
        match self {
            Self::Empty => true,
            Self::Expr(expr) => matches!(eval::evaluate(expr, resolve), Ok(true)),
        }
    }

    /// The three-valued result of matching `tags`.
    #[must_use]
    pub fn outcome(&self, tags: &dyn Tagged) -> Outcome {
        match self {
            Self::Empty => Ok(true),
            Self::Expr(expr) => eval::evaluate(expr, &|key: &str| tags.get(key)),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Conditions in the order they appear.
    #[must_use]
    pub fn conditions(&self) -> Vec<&Condition> {
        match self {
            Self::Empty => Vec::new(),
            Self::Expr(expr) => expr.conditions(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Expr(expr) => write!(f, "{expr}"),
        }
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Returns the query that matches every tag set.
#[must_use]
pub const fn match_all() -> Query {
    Query::Empty
}

/// Anything that can produce a compiled query.
pub trait Queryable {
    /// # Errors
    ///
    /// Returns `QueryError::Parse` if the underlying text is malformed.
    fn query(&self) -> Result<Query, QueryError>;
}

impl<T: Queryable + ?Sized> Queryable for &T {
    fn query(&self) -> Result<Query, QueryError> {
        (**self).query()
    }
}

impl Queryable for Query {
    fn query(&self) -> Result<Query, QueryError> {
        Ok(self.clone())
    }
}

impl Queryable for str {
    fn query(&self) -> Result<Query, QueryError> {
        Query::parse(self)
    }
}

impl Queryable for String {
    fn query(&self) -> Result<Query, QueryError> {
        Query::parse(self)
    }
}

/// Unparsed query text, compiled when a subscriber asks for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryString(String);

impl QueryString {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Queryable for QueryString {
    fn query(&self) -> Result<Query, QueryError> {
        Query::parse(&self.0)
    }
}

impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
