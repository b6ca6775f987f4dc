//! Tag sets: records viewed as ordered string-keyed values for filtering.
//!
//! A [`Tagged`] value is what queries are matched against. Three providers
//! ship with the crate:
//!
//! - [`TagMap`]: an owned map with lexicographically sorted keys.
//! - [`FieldTags`]: a live view over a record's declared tag fields.
//! - [`CombinedTags`]: several tag sets layered into one.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::value::TagValue;

/// Combining several tag sets into one.
pub mod combined;
/// Tag sets derived from record fields.
pub mod fields;

pub use combined::{CombineMode, CombinedTags};
pub use fields::{FieldSource, FieldTags, TagFields};

/// A record exposed as an ordered set of tag keys and values.
///
/// `get` must return `Some` for every key that `keys` returns.
pub trait Tagged {
    /// Tag keys in the provider's order.
    fn keys(&self) -> Vec<&str>;

    /// Looks up a tag value.
    fn get(&self, key: &str) -> Option<TagValue>;

    /// Number of keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Tagged + ?Sized> Tagged for &T {
    fn keys(&self) -> Vec<&str> {
        (**self).keys()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        (**self).get(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<T: Tagged + ?Sized> Tagged for Box<T> {
    fn keys(&self) -> Vec<&str> {
        (**self).keys()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        (**self).get(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<T: Tagged + ?Sized> Tagged for Arc<T> {
    fn keys(&self) -> Vec<&str> {
        (**self).keys()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        (**self).get(key)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

/// A plain map of tags.
///
/// Keys iterate in sorted order so serialized tag maps are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TagMap(BTreeMap<String, TagValue>);

impl TagMap {
    /// Creates an empty tag map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots every key and value of another tag set.
    #[must_use]
    pub fn from_tagged(tags: &dyn Tagged) -> Self {
        tags.keys()
            .into_iter()
            .filter_map(|key| tags.get(key).map(|value| (key.to_string(), value)))
            .collect()
    }

    /// Adds or replaces a tag, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Option<TagValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Adds a tag, consuming and returning the map.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagValue)> {
        self.0.iter()
    }
}

impl Tagged for TagMap {
    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        self.0.get(key).cloned()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<TagValue>, const N: usize> From<[(K, V); N]> for TagMap {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}
