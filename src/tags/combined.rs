//! Layering several tag sets into one.

use std::collections::HashMap;
use std::fmt;

use crate::tags::Tagged;
use crate::value::TagValue;

/// How overlapping keys are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombineMode {
    /// The first source declaring a key supplies its value.
    Merge,
    /// Every source declaring a key contributes a value.
    Concat,
}

/// Several tag sets exposed as one.
///
/// Keys keep first-seen order across the sources. Under
/// [`CombineMode::Concat`] a key declared by more than one source resolves
/// to a [`TagValue::List`] of the values in source order.
pub struct CombinedTags<'a> {
    mode: CombineMode,
    keys: Vec<&'a str>,
    sources: HashMap<&'a str, Vec<&'a dyn Tagged>>,
}

impl<'a> CombinedTags<'a> {
    /// Combines with first-source-wins semantics.
    #[must_use]
    pub fn merge(tags: &[&'a dyn Tagged]) -> Self {
        Self::new(CombineMode::Merge, tags)
    }

    /// Combines collecting every source's value per key.
    #[must_use]
    pub fn concat(tags: &[&'a dyn Tagged]) -> Self {
        Self::new(CombineMode::Concat, tags)
    }

    #[must_use]
    pub fn new(mode: CombineMode, tags: &[&'a dyn Tagged]) -> Self {
        let mut combined = Self {
            mode,
            keys: Vec::new(),
            sources: HashMap::new(),
        };
        for tagged in tags {
            combined.add(*tagged);
        }
        combined
    }

    /// Layers another source underneath the existing ones.
    pub fn add(&mut self, tagged: &'a dyn Tagged) {
        for key in tagged.keys() {
            match self.sources.get_mut(key) {
                Some(sources) => {
                    if self.mode == CombineMode::Concat {
                        sources.push(tagged);
                    }
                }
                None => {
                    self.keys.push(key);
                    self.sources.insert(key, vec![tagged]);
                }
            }
        }
    }

    #[must_use]
    pub const fn mode(&self) -> CombineMode {
        self.mode
    }
}

impl Tagged for CombinedTags<'_> {
    fn keys(&self) -> Vec<&str> {
        self.keys.clone()
    }

    fn get(&self, key: &str) -> Option<TagValue> {
        let sources = self.sources.get(key)?;
        match sources.as_slice() {
            [] => None,
            [only] => only.get(key),
            many => {
                let values: Vec<TagValue> = many.iter().filter_map(|t| t.get(key)).collect();
                Some(TagValue::List(values))
            }
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

impl fmt::Debug for CombinedTags<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CombinedTags")
            .field("mode", &self.mode)
            .field("keys", &self.keys)
            .finish()
    }
}
