use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::{Key, MAX_TAG_LENGTH, Tag, TagError, is_printable};

/// A modification applied when deriving a [`TagMap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mutator {
    /// Inserts the value only if the key is not yet present.
    Insert(Key, String),
    /// Replaces the value only if the key is already present.
    Update(Key, String),
    /// Inserts or replaces the value.
    Upsert(Key, String),
    /// Removes the key if it is present.
    Delete(Key),
}

impl Mutator {
    /// Creates a mutator that inserts `value` unless `key` is already present.
    pub fn insert(key: Key, value: impl Into<String>) -> Self {
        Self::Insert(key, value.into())
    }

    /// Creates a mutator that replaces the value of `key` if it is present.
    pub fn update(key: Key, value: impl Into<String>) -> Self {
        Self::Update(key, value.into())
    }

    /// Creates a mutator that sets `key` to `value` unconditionally.
    pub fn upsert(key: Key, value: impl Into<String>) -> Self {
        Self::Upsert(key, value.into())
    }

    /// Creates a mutator that removes `key`.
    pub fn delete(key: Key) -> Self {
        Self::Delete(key)
    }

    fn validate(&self) -> Result<(), TagError> {
        let (key, value) = match self {
            Self::Insert(key, value) | Self::Update(key, value) | Self::Upsert(key, value) => {
                (key, value)
            }
            Self::Delete(_) => return Ok(()),
        };

        if value.len() > MAX_TAG_LENGTH || !is_printable(value) {
            return Err(TagError::InvalidValue {
                key: key.name().to_owned(),
                value: value.clone(),
            });
        }

        Ok(())
    }

    fn apply(self, tags: &mut BTreeMap<Key, String>) {
        match self {
            Self::Insert(key, value) => {
                tags.entry(key).or_insert(value);
            }
            Self::Update(key, value) => {
                if let Some(existing) = tags.get_mut(&key) {
                    *existing = value;
                }
            }
            Self::Upsert(key, value) => {
                tags.insert(key, value);
            }
            Self::Delete(key) => {
                tags.remove(&key);
            }
        }
    }
}

/// An immutable set of tags, at most one value per key.
///
/// Tags are kept ordered by key name, so iteration order is deterministic.
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagMap {
    tags: BTreeMap<Key, String>,
}

impl TagMap {
    /// Returns an empty tag map.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a new tag map by applying mutators to an empty map.
    pub fn new(mutators: impl IntoIterator<Item = Mutator>) -> Result<Self, TagError> {
        Self::empty().derive(mutators)
    }

    /// Derives a new tag map from this one by applying mutators in order.
    ///
    /// If any mutator carries an invalid value, no map is created and the first error is
    /// returned. `self` is never modified.
    pub fn derive(&self, mutators: impl IntoIterator<Item = Mutator>) -> Result<Self, TagError> {
        let mut tags = self.tags.clone();
        for mutator in mutators {
            mutator.validate()?;
            mutator.apply(&mut tags);
        }

        Ok(Self { tags })
    }

    /// Returns the value assigned to `key`, if any.
    pub fn value(&self, key: &Key) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the number of tags in this map.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns `true` if this map contains no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates over all tags ordered by key name.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &str)> + '_ {
        self.tags.iter().map(|(key, value)| (key, value.as_str()))
    }

    /// Returns all tags ordered by key name.
    pub fn to_tags(&self) -> Vec<Tag> {
        self.iter()
            .map(|(key, value)| Tag::new(key.clone(), value))
            .collect()
    }
}

impl fmt::Debug for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{ ")?;
        for (key, value) in self.iter() {
            write!(f, "{{{key} {value}}} ")?;
        }
        f.write_str("}")
    }
}
