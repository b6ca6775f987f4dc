//! Values that tags can hold.
//!
//! Every tag value has one canonical string form (its `Display`), which is
//! what quoted-string comparisons, `CONTAINS`, and field-derived tag sets
//! see. Typed variants let the evaluator compare numbers and instants
//! without a round trip through text.

use std::fmt;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Possible values a tag can hold.
///
/// # Examples
///
/// ```
/// use chain_events::TagValue;
///
/// assert_eq!(TagValue::from(vec![0xFFu8, 0x01]).to_string(), "FF01");
/// assert_eq!(TagValue::from(42u64).to_string(), "42");
/// assert_eq!(
///     TagValue::List(vec![5i64.into(), 7i64.into(), 9i64.into()]).to_string(),
///     "5;7;9"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Time(DateTime<Utc>),
    Bytes(Vec<u8>),
    /// Several values under one key, e.g. from concatenated tag sets or a
    /// slice field.
    List(Vec<TagValue>),
}

impl TagValue {
    /// Interprets this value as a number.
    ///
    /// Strings are parsed as integers first, then as floats.
    #[must_use]
    pub fn to_numeric(&self) -> Option<Numeric> {
        match self {
            Self::Int(v) => Some(Numeric::Int(i128::from(*v))),
            Self::Uint(v) => Some(Numeric::Int(i128::from(*v))),
            Self::Float(v) if v.is_nan() => None,
            Self::Float(v) => Some(Numeric::Float(*v)),
            Self::String(s) => Numeric::parse(s.trim()),
            _ => None,
        }
    }

    /// Interprets this value as an instant (RFC3339 for strings).
    #[must_use]
    pub fn to_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            Self::String(s) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }

    /// Interprets this value as a calendar date.
    ///
    /// Accepts `YYYY-MM-DD` strings as well as full instants.
    #[must_use]
    pub fn to_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Time(t) => Some(t.date_naive()),
            Self::String(s) => {
                let s = s.trim();
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| self.to_time().map(|t| t.date_naive()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => f.write_str(v),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Time(v) => f.write_str(&format_time(v)),
            Self::Bytes(v) => f.write_str(&hex::encode_upper(v)),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// Tags serialize as their canonical strings.
impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// RFC3339 with whole seconds and a `Z` suffix for UTC.
#[must_use]
pub fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A number recovered from a tag value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i128),
    Float(f64),
}

impl Numeric {
    /// Parses decimal text, preferring an exact integer.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(v) = s.parse::<i128>() {
            return Some(Self::Int(v));
        }
        match s.parse::<f64>() {
            Ok(v) if !v.is_nan() => Some(Self::Float(v)),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }

    /// Compares two numbers, exactly when both are integers.
    #[must_use]
    pub fn compare(self, other: Self) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Conversion of a record field into a tag value.
///
/// Implemented for the scalar types that appear in domain records; byte
/// vectors and arrays become [`TagValue::Bytes`], integer vectors become
/// [`TagValue::List`].
pub trait ToTagValue {
    fn to_tag_value(&self) -> TagValue;
}

impl<T: ToTagValue + ?Sized> ToTagValue for &T {
    fn to_tag_value(&self) -> TagValue {
        (**self).to_tag_value()
    }
}

impl ToTagValue for TagValue {
    fn to_tag_value(&self) -> TagValue {
        self.clone()
    }
}

impl ToTagValue for str {
    fn to_tag_value(&self) -> TagValue {
        TagValue::String(self.to_string())
    }
}

impl ToTagValue for String {
    fn to_tag_value(&self) -> TagValue {
        TagValue::String(self.clone())
    }
}

impl ToTagValue for bool {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Bool(*self)
    }
}

impl ToTagValue for f32 {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Float(f64::from(*self))
    }
}

impl ToTagValue for f64 {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Float(*self)
    }
}

impl ToTagValue for DateTime<Utc> {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Time(*self)
    }
}

impl ToTagValue for [u8] {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Bytes(self.to_vec())
    }
}

impl ToTagValue for Vec<u8> {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Bytes(self.clone())
    }
}

impl<const N: usize> ToTagValue for [u8; N] {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Bytes(self.to_vec())
    }
}

impl ToTagValue for Vec<String> {
    fn to_tag_value(&self) -> TagValue {
        TagValue::List(self.iter().map(|s| TagValue::String(s.clone())).collect())
    }
}

impl<T: ToTagValue> ToTagValue for Option<T> {
    fn to_tag_value(&self) -> TagValue {
        match self {
            Some(v) => v.to_tag_value(),
            None => TagValue::String(String::new()),
        }
    }
}

macro_rules! signed_tag_values {
    ($($t:ty),*) => {$(
        impl ToTagValue for $t {
            fn to_tag_value(&self) -> TagValue {
                TagValue::Int(i64::from(*self))
            }
        }

        impl ToTagValue for Vec<$t> {
            fn to_tag_value(&self) -> TagValue {
                TagValue::List(self.iter().map(|v| TagValue::Int(i64::from(*v))).collect())
            }
        }

        impl From<$t> for TagValue {
            fn from(v: $t) -> Self {
                Self::Int(i64::from(v))
            }
        }
    )*};
}

macro_rules! unsigned_tag_values {
    ($($t:ty),*) => {$(
        impl ToTagValue for $t {
            fn to_tag_value(&self) -> TagValue {
                TagValue::Uint(u64::from(*self))
            }
        }

        impl ToTagValue for Vec<$t> {
            fn to_tag_value(&self) -> TagValue {
                TagValue::List(self.iter().map(|v| TagValue::Uint(u64::from(*v))).collect())
            }
        }

        impl From<$t> for TagValue {
            fn from(v: $t) -> Self {
                Self::Uint(u64::from(v))
            }
        }
    )*};
}

signed_tag_values!(i16, i32, i64);
unsigned_tag_values!(u16, u32, u64);

impl ToTagValue for u8 {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Uint(u64::from(*self))
    }
}

impl ToTagValue for usize {
    fn to_tag_value(&self) -> TagValue {
        TagValue::Uint(*self as u64)
    }
}

impl ToTagValue for Vec<usize> {
    fn to_tag_value(&self) -> TagValue {
        TagValue::List(self.iter().map(|v| TagValue::Uint(*v as u64)).collect())
    }
}

impl From<usize> for TagValue {
    fn from(v: usize) -> Self {
        Self::Uint(v as u64)
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<DateTime<Utc>> for TagValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Time(v)
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bytes_render_as_uppercase_hex() {
        assert_eq!(TagValue::from(vec![0xFF, 0xFF, 0xFF]).to_string(), "FFFFFF");
        assert_eq!([0xABu8; 2].to_tag_value().to_string(), "ABAB");
    }

    #[test]
    fn test_integer_vectors_render_semicolon_joined() {
        assert_eq!(vec![5i64, 7, 9].to_tag_value().to_string(), "5;7;9");
        assert_eq!(Vec::<u32>::new().to_tag_value().to_string(), "");
    }

    #[test]
    fn test_time_renders_rfc3339() {
        let t = Utc.with_ymd_and_hms(2013, 5, 3, 14, 45, 0).unwrap();
        assert_eq!(TagValue::Time(t).to_string(), "2013-05-03T14:45:00Z");
    }

    #[test]
    fn test_float_renders_minimal() {
        assert_eq!(TagValue::Float(80.0).to_string(), "80");
        assert_eq!(TagValue::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_none_renders_empty() {
        let missing: Option<u64> = None;
        assert_eq!(missing.to_tag_value().to_string(), "");
        assert_eq!(Some(3u64).to_tag_value().to_string(), "3");
    }

    #[test]
    fn test_to_numeric_from_strings() {
        assert_eq!(TagValue::from("80").to_numeric(), Some(Numeric::Int(80)));
        assert_eq!(TagValue::from("8.5").to_numeric(), Some(Numeric::Float(8.5)));
        assert_eq!(TagValue::from("-3").to_numeric(), Some(Numeric::Int(-3)));
        assert_eq!(TagValue::from("marmot").to_numeric(), None);
        assert_eq!(TagValue::Bool(true).to_numeric(), None);
    }

    #[test]
    fn test_numeric_compare_mixed() {
        use std::cmp::Ordering;
        assert_eq!(Numeric::Int(45).compare(Numeric::Float(44.5)), Some(Ordering::Greater));
        assert_eq!(Numeric::Int(u64::MAX as i128).compare(Numeric::Int(u64::MAX as i128 - 1)), Some(Ordering::Greater));
    }

    #[test]
    fn test_to_date_accepts_date_and_instant() {
        let d = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap();
        assert_eq!(TagValue::from("2017-01-01").to_date(), Some(d));
        assert_eq!(TagValue::from("2017-01-01T10:00:00Z").to_date(), Some(d));
        assert_eq!(TagValue::from("yesterday").to_date(), None);
    }

    #[test]
    fn test_serializes_as_canonical_string() {
        let json = serde_json::to_string(&TagValue::from(vec![1u8, 2])).unwrap();
        assert_eq!(json, "\"0102\"");
    }
}
