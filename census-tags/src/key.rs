use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{MAX_TAG_LENGTH, TagError, is_printable};

/// The name of a tag dimension.
///
/// Keys are validated on construction and compare equal if and only if they were created with the
/// same name. Cloning a key is cheap, all clones share the same allocation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Arc<str>);

impl Key {
    /// Creates a new key after validating its name.
    ///
    /// Key names must not be empty, must be at most [`MAX_TAG_LENGTH`] bytes long, and may only
    /// contain printable ASCII characters.
    pub fn new(name: impl AsRef<str>) -> Result<Self, TagError> {
        let name = name.as_ref();
        if name.is_empty() || name.len() > MAX_TAG_LENGTH || !is_printable(name) {
            return Err(TagError::InvalidKey(name.to_owned()));
        }

        Ok(Self(name.into()))
    }

    /// Returns the name of the key.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({:?})", self.name())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        self.name()
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        self.name()
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Key::new(name).map_err(serde::de::Error::custom)
    }
}

/// A key paired with a value.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    /// The tag key.
    pub key: Key,
    /// The tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag from a key and a value.
    pub fn new(key: Key, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// Sorts keys by name and removes duplicates.
pub fn canonical_keys(keys: impl IntoIterator<Item = Key>) -> Vec<Key> {
    let mut keys: Vec<Key> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();
    keys
}
