//! Programmatic construction of query text.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::QueryError;
use crate::value::format_time;

use super::{Query, Queryable};

/// An operand rendered into query text.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryArg(String);

impl QueryArg {
    /// Quotes the `Display` form of any value.
    pub fn display(value: impl fmt::Display) -> Self {
        Self(format!("'{value}'"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryArg {
    fn from(v: &str) -> Self {
        Self(format!("'{v}'"))
    }
}

impl From<String> for QueryArg {
    fn from(v: String) -> Self {
        Self::from(v.as_str())
    }
}

impl From<&String> for QueryArg {
    fn from(v: &String) -> Self {
        Self::from(v.as_str())
    }
}

impl From<bool> for QueryArg {
    fn from(v: bool) -> Self {
        Self(v.to_string())
    }
}

impl From<DateTime<Utc>> for QueryArg {
    fn from(v: DateTime<Utc>) -> Self {
        Self(format!("TIME {}", format_time(&v)))
    }
}

impl From<NaiveDate> for QueryArg {
    fn from(v: NaiveDate) -> Self {
        Self(format!("DATE {}", v.format("%Y-%m-%d")))
    }
}

macro_rules! numeric_query_args {
    ($($t:ty),*) => {$(
        impl From<$t> for QueryArg {
            fn from(v: $t) -> Self {
                Self(v.to_string())
            }
        }
    )*};
}

numeric_query_args!(u8, u16, u32, u64, usize, i8, i16, i32, i64, f32, f64);

/// Accumulates AND-joined conditions as canonical query text.
///
/// Every method returns a new builder; the receiver is left untouched.
///
/// ```
/// use chain_events::QueryBuilder;
///
/// let base = QueryBuilder::new().and_equals("EventType", "CallEvent");
/// let tall = base.and_greater_than_or_equal("Height", 45u64);
/// assert_eq!(base.as_str(), "EventType = 'CallEvent'");
/// assert_eq!(tall.as_str(), "EventType = 'CallEvent' AND Height >= 45");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBuilder {
    query: String,
}

impl QueryBuilder {
    /// An empty builder, which compiles to the empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing query fragments, AND-joined.
    #[must_use]
    pub fn from_queries<S: AsRef<str>>(queries: &[S]) -> Self {
        queries
            .iter()
            .fold(Self::new(), |builder, q| builder.joined(q.as_ref()))
    }

    /// AND-joins the conditions of other builders.
    #[must_use]
    pub fn and(&self, others: &[&Self]) -> Self {
        others
            .iter()
            .fold(self.clone(), |builder, other| builder.joined(&other.query))
    }

    #[must_use]
    pub fn and_equals(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, "=", operand.into())
    }

    #[must_use]
    pub fn and_not_equals(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, "!=", operand.into())
    }

    #[must_use]
    pub fn and_greater_than_or_equal(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, ">=", operand.into())
    }

    #[must_use]
    pub fn and_less_than_or_equal(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, "<=", operand.into())
    }

    #[must_use]
    pub fn and_strictly_greater_than(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, ">", operand.into())
    }

    #[must_use]
    pub fn and_strictly_less_than(&self, tag: &str, operand: impl Into<QueryArg>) -> Self {
        self.condition(tag, "<", operand.into())
    }

    /// Substring match; the operand is always quoted.
    #[must_use]
    pub fn and_contains(&self, tag: &str, substring: &str) -> Self {
        self.condition(tag, "CONTAINS", QueryArg::from(substring))
    }

    /// The accumulated query text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.query
    }

    /// Compiles the accumulated text.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Parse` if a fragment passed to
    /// [`from_queries`](Self::from_queries) or an operand was malformed.
    pub fn query(&self) -> Result<Query, QueryError> {
        Query::parse(&self.query)
    }

    fn condition(&self, tag: &str, op: &str, operand: QueryArg) -> Self {
        self.joined(&format!("{tag} {op} {}", operand.as_str()))
    }

    fn joined(&self, fragment: &str) -> Self {
        let fragment = fragment.trim();
        if fragment.is_empty() || fragment.eq_ignore_ascii_case("empty") {
            return self.clone();
        }
        let fragment = if has_or(fragment) {
            format!("({fragment})")
        } else {
            fragment.to_string()
        };
        let query = if self.query.is_empty() {
            fragment
        } else {
            format!("{} AND {fragment}", self.query)
        };
        Self { query }
    }
}

// A fragment with a top-level OR must be grouped so the joining AND does not
// bind into it. Scanning words is conservative: an OR inside a quoted value
// only adds redundant parentheses.
fn has_or(fragment: &str) -> bool {
    fragment
        .split(|c: char| c.is_whitespace() || c == '(' || c == ')')
        .any(|word| word.eq_ignore_ascii_case("or"))
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query)
    }
}

impl Queryable for QueryBuilder {
    fn query(&self) -> Result<Query, QueryError> {
        Self::query(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagMap;
    use chrono::TimeZone;

    #[test]
    fn test_operands_render_canonically() {
        let t = Utc.with_ymd_and_hms(2013, 5, 3, 14, 45, 0).unwrap();
        let q = QueryBuilder::new()
            .and_equals("name", "marmot")
            .and_equals("flag", true)
            .and_strictly_greater_than("n", 45u32)
            .and_less_than_or_equal("ratio", 0.5f64)
            .and_greater_than_or_equal("time", t)
            .and_not_equals("day", NaiveDate::from_ymd_opt(2017, 1, 1).unwrap());
        assert_eq!(
            q.as_str(),
            "name = 'marmot' AND flag = true AND n > 45 AND ratio <= 0.5 \
             AND time >= TIME 2013-05-03T14:45:00Z AND day != DATE 2017-01-01"
        );
        assert!(q.query().is_ok());
    }

    #[test]
    fn test_methods_do_not_mutate_receiver() {
        let base = QueryBuilder::new().and_equals("a", 1u8);
        let left = base.and_equals("b", 2u8);
        let right = base.and_contains("c", "x");
        assert_eq!(base.as_str(), "a = 1");
        assert_eq!(left.as_str(), "a = 1 AND b = 2");
        assert_eq!(right.as_str(), "a = 1 AND c CONTAINS 'x'");
    }

    #[test]
    fn test_empty_builder_compiles_to_empty_query() {
        let q = QueryBuilder::new().query().unwrap();
        assert!(q.is_empty());
        assert!(q.matches(&TagMap::new()));
    }

    #[test]
    fn test_and_combines_builders() {
        let a = QueryBuilder::new().and_equals("a", "1");
        let b = QueryBuilder::new().and_equals("b", "2");
        let empty = QueryBuilder::new();
        assert_eq!(a.and(&[&b, &empty]).as_str(), "a = '1' AND b = '2'");
    }

    #[test]
    fn test_from_queries_groups_disjunctions() {
        let q = QueryBuilder::from_queries(&["a = 1 OR b = 2", "empty", "c = 3"]);
        assert_eq!(q.as_str(), "(a = 1 OR b = 2) AND c = 3");

        let tags = TagMap::from([("a", 5i64), ("b", 5i64), ("c", 3i64)]);
        assert!(!q.query().unwrap().matches(&tags));
    }

    #[test]
    fn test_display_operand_is_quoted() {
        let q = QueryBuilder::new().and_equals("Address", QueryArg::display(hex::encode_upper([0xAB, 0xCD])));
        assert_eq!(q.to_string(), "Address = 'ABCD'");
    }

    #[test]
    fn test_round_trip_matches_direct_evaluation() {
        let tags = TagMap::new().with("Height", 45u64).with("EventType", "CallEvent");
        let q = QueryBuilder::new()
            .and_equals("EventType", "CallEvent")
            .and_greater_than_or_equal("Height", 45u64)
            .and_strictly_less_than("Height", 46u64);
        assert!(q.query().unwrap().matches(&tags));
        assert!(!q.and_equals("Height", 44u64).query().unwrap().matches(&tags));
    }
}
