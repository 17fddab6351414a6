//! Tag keys, values and tag maps for Census measurements.
//!
//! Tags are key/value pairs attached to recorded measurements. Views group their aggregations
//! by a subset of tag keys, so every distinct combination of values for those keys becomes a
//! separate row.
//!
//! A [`TagMap`] is immutable once built. New maps are derived from an existing one by applying
//! a sequence of [`Mutator`]s:
//!
//! ```
//! use census_tags::{Key, Mutator, TagMap};
//!
//! let method = Key::new("method").unwrap();
//! let route = Key::new("route").unwrap();
//!
//! let parent = TagMap::new(vec![Mutator::insert(method.clone(), "GET")]).unwrap();
//! let child = parent
//!     .derive(vec![
//!         Mutator::upsert(method.clone(), "POST"),
//!         Mutator::insert(route.clone(), "/users"),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(parent.value(&method), Some("GET"));
//! assert_eq!(child.value(&method), Some("POST"));
//! assert_eq!(child.value(&route), Some("/users"));
//! ```

#![warn(missing_docs)]

mod key;
mod map;

pub use self::key::*;
pub use self::map::*;

/// The maximum length of tag keys and tag values, in bytes.
pub const MAX_TAG_LENGTH: usize = 255;

/// An error returned when creating invalid tag keys or values.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// The tag key is empty, too long or contains non-printable characters.
    #[error("invalid tag key {0:?}: must be 1 to 255 printable ASCII characters")]
    InvalidKey(String),
    /// The tag value is too long or contains non-printable characters.
    #[error("invalid value {value:?} for tag key {key:?}: must be at most 255 printable ASCII characters")]
    InvalidValue {
        /// The key the value was assigned to.
        key: String,
        /// The rejected value.
        value: String,
    },
}

/// Returns `true` if the string consists of printable ASCII characters only.
pub(crate) fn is_printable(s: &str) -> bool {
    s.bytes().all(|b| (b' '..=b'~').contains(&b))
}
