//! # Name Mapper
//!
//! Maps a Subscription to the name of its EventMesh counterpart. EventMesh
//! names are length limited and global, so the readable name is truncated
//! and suffixed with a hash of domain, namespace and name.

use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Write as _;

/// Length of the hash suffix in hex characters
pub const HASH_LENGTH: usize = 40;

/// Maps Subscription names to backend safe identifiers
pub trait NameMapper: Send + Sync + fmt::Debug {
    fn map_subscription_name(&self, name: &str, namespace: &str) -> String;
}

/// Name mapper honouring the EventMesh length limit
#[derive(Debug, Clone)]
pub struct EventMeshNameMapper {
    domain: String,
    max_length: usize,
}

impl EventMeshNameMapper {
    /// # Panics
    ///
    /// Panics when `max_length` cannot hold the hash suffix.
    #[must_use]
    pub fn new(domain: impl Into<String>, max_length: usize) -> Self {
        assert!(
            max_length >= HASH_LENGTH,
            "max subscription name length {max_length} is shorter than the hash ({HASH_LENGTH})"
        );
        Self {
            domain: domain.into(),
            max_length,
        }
    }
}

impl NameMapper for EventMeshNameMapper {
    fn map_subscription_name(&self, name: &str, namespace: &str) -> String {
        let hash = name_hash(&self.domain, namespace, name);
        shorten_name_and_append_hash(name, &hash, self.max_length)
    }
}

/// Hex hash identifying (domain, namespace, name)
fn name_hash(domain: &str, namespace: &str, name: &str) -> String {
    let digest = Sha256::digest(format!("{domain}/{namespace}/{name}").as_bytes());
    let mut hex = String::with_capacity(HASH_LENGTH);
    for byte in digest.iter().take(HASH_LENGTH / 2) {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Truncates `name` so that `name + hash` fits in `max_length` bytes
///
/// The cut falls on a char boundary, so a multi-byte char that would
/// straddle the limit is dropped whole.
///
/// # Panics
///
/// Panics when the hash alone is longer than `max_length`; the hash is never cut.
#[must_use]
pub fn shorten_name_and_append_hash(name: &str, hash: &str, max_length: usize) -> String {
    assert!(
        hash.len() <= max_length,
        "hash length {} exceeds max name length {max_length}",
        hash.len()
    );
    let max_name_len = max_length - hash.len();
    let cut = name
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= max_name_len)
        .last()
        .unwrap_or(0);
    format!("{}{hash}", &name[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_is_bounded_and_ends_with_hash() {
        let long_name = "a-very-long-subscription-name-that-does-not-fit-anywhere";
        for max_len in [HASH_LENGTH, HASH_LENGTH + 1, 50, 64, 200] {
            let mapper = EventMeshNameMapper::new("example.com", max_len);
            for name in ["s", "order-created", long_name] {
                let mapped = mapper.map_subscription_name(name, "default");
                let hash = name_hash("example.com", "default", name);
                assert!(mapped.len() <= max_len, "{mapped} longer than {max_len}");
                assert!(mapped.ends_with(&hash));
            }
        }
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let mapper = EventMeshNameMapper::new("example.com", 50);
        assert_eq!(
            mapper.map_subscription_name("sub", "ns"),
            mapper.map_subscription_name("sub", "ns")
        );
    }

    #[test]
    fn test_swapped_namespace_and_name_differ() {
        let mapper = EventMeshNameMapper::new("example.com", 50);
        assert_ne!(
            mapper.map_subscription_name("a", "b"),
            mapper.map_subscription_name("b", "a")
        );
        assert_ne!(
            mapper.map_subscription_name("bc", "a"),
            mapper.map_subscription_name("c", "ab")
        );
    }

    #[test]
    fn test_domain_is_part_of_the_hash() {
        let a = EventMeshNameMapper::new("one.example.com", 50);
        let b = EventMeshNameMapper::new("two.example.com", 50);
        assert_ne!(
            a.map_subscription_name("sub", "ns"),
            b.map_subscription_name("sub", "ns")
        );
    }

    #[test]
    fn test_name_is_truncated_not_hash() {
        let mapped = shorten_name_and_append_hash("abcdef", "0123", 6);
        assert_eq!(mapped, "ab0123");
        assert_eq!(shorten_name_and_append_hash("abcdef", "0123", 4), "0123");
    }

    #[test]
    fn test_multibyte_name_is_cut_on_char_boundary() {
        // "ä" is two bytes, the limit falls in the middle of the second one
        assert_eq!(shorten_name_and_append_hash("aäb", "0123", 6), "a0123");
        assert_eq!(shorten_name_and_append_hash("aäb", "0123", 7), "aä0123");

        let mapper = EventMeshNameMapper::new("example.com", 50);
        let mapped = mapper.map_subscription_name(&"ü".repeat(30), "ns");
        assert!(mapped.len() <= 50, "{mapped} is {} bytes", mapped.len());
        assert!(mapped.starts_with(&"ü".repeat(5)));
    }

    #[test]
    #[should_panic(expected = "exceeds max name length")]
    fn test_hash_longer_than_max_panics() {
        let _ = shorten_name_and_append_hash("abc", "0123456789", 5);
    }

    #[test]
    #[should_panic(expected = "shorter than the hash")]
    fn test_mapper_rejects_too_small_limit() {
        let _ = EventMeshNameMapper::new("example.com", HASH_LENGTH - 1);
    }
}
