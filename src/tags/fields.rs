//! Tag sets derived from the declared fields of a record.
//!
//! A record type opts in by implementing [`TagFields`], usually through the
//! [`tag_fields!`](crate::tag_fields) macro, which lists the tag name and the
//! struct field behind it in declaration order. [`FieldTags`] then exposes
//! the record as a [`Tagged`] view whose values are rendered with the
//! canonical [`TagValue`] formatting:
//!
//! - byte vectors and arrays: uppercase hex
//! - integers: decimal
//! - instants: RFC3339
//! - integer vectors: `;`-joined decimals
//!
//! The view reads the record on every `get`, so when it wraps a shared
//! handle (`Arc<RwLock<T>>`) later mutations are visible without rebuilding it.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::TagError;
use crate::tags::Tagged;
use crate::value::TagValue;

/// A record type with a fixed, ordered list of tag fields.
pub trait TagFields {
    /// Type name used in error messages.
    const TYPE_NAME: &'static str;

    /// Tag names in declaration order.
    fn field_names() -> &'static [&'static str];

    /// The typed value behind a tag name.
    fn field_value(&self, name: &str) -> Option<TagValue>;
}

/// Implements [`TagFields`] for a struct by listing `"TagName" => field` pairs.
///
/// ```
/// use chain_events::tag_fields;
/// use chain_events::tags::{FieldTags, Tagged};
///
/// struct Receipt {
///     height: u64,
///     hash: Vec<u8>,
/// }
///
/// tag_fields!(Receipt {
///     "Height" => height,
///     "Hash" => hash,
/// });
///
/// let receipt = Receipt { height: 7, hash: vec![0xAB, 0xCD] };
/// let tags = FieldTags::new(&receipt);
/// assert_eq!(tags.keys(), vec!["Height", "Hash"]);
/// assert_eq!(tags.get("Hash").unwrap().to_string(), "ABCD");
/// ```
#[macro_export]
macro_rules! tag_fields {
    ($ty:ident { $($name:literal => $field:ident),+ $(,)? }) => {
        impl $crate::tags::TagFields for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn field_names() -> &'static [&'static str] {
                &[$($name),+]
            }

            fn field_value(&self, name: &str) -> Option<$crate::value::TagValue> {
                match name {
                    $($name => Some($crate::value::ToTagValue::to_tag_value(&self.$field)),)+
                    _ => None,
                }
            }
        }
    };
}

/// Something that can lend out a [`TagFields`] record for reading.
pub trait FieldSource {
    type Record: TagFields;

    fn read<R>(&self, f: impl FnOnce(&Self::Record) -> R) -> R;
}

impl<T: TagFields> FieldSource for &T {
    type Record = T;

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(*self)
    }
}

impl<T: TagFields> FieldSource for Arc<T> {
    type Record = T;

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&**self)
    }
}

impl<T: TagFields> FieldSource for Arc<RwLock<T>> {
    type Record = T;

    fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let lock: &RwLock<T> = self;
        let guard = lock.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

/// A [`Tagged`] view over a record's tag fields.
#[derive(Debug, Clone)]
pub struct FieldTags<S> {
    source: S,
    fields: Vec<&'static str>,
}

impl<S: FieldSource> FieldTags<S> {
    /// Exposes every declared tag field.
    pub fn new(source: S) -> Self {
        Self {
            source,
            fields: S::Record::field_names().to_vec(),
        }
    }

    /// Exposes only the named fields, in the order given.
    ///
    /// # Errors
    ///
    /// Returns `TagError::UnknownField` if a name is not a declared tag field.
    pub fn with_fields(source: S, names: &[&str]) -> Result<Self, TagError> {
        let declared = S::Record::field_names();
        let fields = names
            .iter()
            .map(|name| {
                declared
                    .iter()
                    .copied()
                    .find(|declared| declared == name)
                    .ok_or_else(|| TagError::UnknownField {
                        field: (*name).to_string(),
                        type_name: S::Record::TYPE_NAME,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { source, fields })
    }

    /// The wrapped record handle.
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: FieldSource> Tagged for FieldTags<S> {
    fn keys(&self) -> Vec<&str> {
        self.fields.clone()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        let field = self.fields.iter().copied().find(|f| *f == key)?;
        self.source
            .read(|record| record.field_value(field))
            .map(|value| TagValue::String(value.to_string()))
    }

    fn len(&self) -> usize {
        self.fields.len()
    }
}
