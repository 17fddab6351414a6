//! Encoding of tag values into row signatures.
//!
//! A signature identifies a row in a view. It contains the values of the view's tag keys in key
//! order, each prefixed with its length as a two byte little-endian integer. A length of `0` marks
//! a key without value, so empty values and missing tags share the same signature.

use census_tags::{Key, Tag, TagMap};

/// Encodes the values of `keys` in `tags` into a signature.
///
/// `keys` must be in canonical order, see [`census_tags::canonical_keys`].
pub fn encode(tags: &TagMap, keys: &[Key]) -> Vec<u8> {
    let mut signature = Vec::with_capacity(keys.len() * 2);

    for key in keys {
        let value = tags.value(key).unwrap_or_default().as_bytes();
        // Tag values are at most 255 bytes long.
        let len = u16::try_from(value.len()).unwrap_or(u16::MAX);
        signature.extend_from_slice(&len.to_le_bytes());
        signature.extend_from_slice(&value[..usize::from(len)]);
    }

    signature
}

/// Decodes a signature created by [`encode`] with the same `keys` back into tags.
///
/// Keys without value are skipped. If the signature is truncated, the tags decoded up to that
/// point are returned.
pub fn decode(signature: &[u8], keys: &[Key]) -> Vec<Tag> {
    let mut tags = Vec::with_capacity(keys.len());
    let mut rest = signature;

    for key in keys {
        let Some((len, tail)) = rest.split_first_chunk::<2>() else {
            break;
        };

        let len = usize::from(u16::from_le_bytes(*len));
        if tail.len() < len {
            break;
        }

        let (value, tail) = tail.split_at(len);
        rest = tail;

        if len > 0 {
            tags.push(Tag::new(key.clone(), String::from_utf8_lossy(value)));
        }
    }

    tags
}

#[cfg(test)]
mod tests {
    use census_tags::Mutator;
    use similar_asserts::assert_eq;

    use super::*;

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|name| Key::new(name).unwrap()).collect()
    }

    fn tags(pairs: &[(&str, &str)]) -> TagMap {
        TagMap::new(
            pairs
                .iter()
                .map(|(key, value)| Mutator::upsert(Key::new(key).unwrap(), *value)),
        )
        .unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let keys = keys(&["method", "route"]);
        let signature = encode(&tags(&[("route", "/a"), ("other", "x")]), &keys);
        assert_eq!(signature, vec![0, 0, 2, 0, b'/', b'a']);
    }

    #[test]
    fn test_round_trip() {
        let keys = keys(&["method", "route", "status"]);
        let map = tags(&[("method", "GET"), ("status", "200"), ("region", "eu")]);

        let decoded = decode(&encode(&map, &keys), &keys);
        assert_eq!(
            decoded,
            vec![
                Tag::new(keys[0].clone(), "GET"),
                Tag::new(keys[2].clone(), "200"),
            ]
        );
    }

    #[test]
    fn test_no_collisions_across_boundaries() {
        let keys = keys(&["a", "b"]);
        let left = encode(&tags(&[("a", "xy"), ("b", "z")]), &keys);
        let right = encode(&tags(&[("a", "x"), ("b", "yz")]), &keys);
        assert_ne!(left, right);
    }

    #[test]
    fn test_empty_and_missing_values_match() {
        let keys = keys(&["a"]);
        assert_eq!(encode(&tags(&[("a", "")]), &keys), encode(&TagMap::empty(), &keys));
    }

    #[test]
    fn test_decode_truncated() {
        let keys = keys(&["a", "b"]);
        let signature = encode(&tags(&[("a", "x"), ("b", "long")]), &keys);

        let decoded = decode(&signature[..signature.len() - 1], &keys);
        assert_eq!(decoded, vec![Tag::new(keys[0].clone(), "x")]);
        assert_eq!(decode(&[1], &keys), Vec::<Tag>::new());
    }
}
