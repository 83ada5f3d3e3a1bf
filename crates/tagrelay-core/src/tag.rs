//! Matching tags.
//!
//! A `Tag` is a 64-bit integer compared by exact equality. There is no
//! wildcard or mask matching anywhere in tagrelay.

use std::fmt;

use rand::RngCore;

/// A 64-bit message matching tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Tag(pub u64);

impl Tag {
    /// Fold a connection salt into this tag.
    ///
    /// Both ends of a Listener-accepted connection hold the same salt, so a
    /// tag salted on the sending side matches the same tag salted on the
    /// receiving side, and nothing else with high probability.
    #[inline]
    pub fn salted(self, salt: u64) -> Tag {
        Tag(mix64(self.0 ^ mix64(salt)))
    }

    /// Generate a random tag (hash of 16 random bytes).
    pub fn random() -> Tag {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Tag(hash64bits(&bytes))
    }
}

impl From<u64> for Tag {
    #[inline]
    fn from(v: u64) -> Self {
        Tag(v)
    }
}

impl From<Tag> for u64 {
    #[inline]
    fn from(t: Tag) -> Self {
        t.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// SplitMix64 finalizer. Bijective, so distinct inputs never collide.
#[inline]
pub fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Hash an arbitrary byte string down to 64 bits: the first eight bytes
/// of its BLAKE3 digest, little-endian.
pub fn hash64bits(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_salted_is_symmetric_per_salt() {
        let a = Tag(7).salted(0xdead_beef);
        let b = Tag(7).salted(0xdead_beef);
        assert_eq!(a, b);
        assert_ne!(a, Tag(7).salted(0xdead_bef0));
        assert_ne!(a, Tag(7));
    }

    #[test]
    fn test_salted_distinct_tags_stay_distinct() {
        let salt = 42;
        let tags: HashSet<Tag> = (0..1000u64).map(|t| Tag(t).salted(salt)).collect();
        assert_eq!(tags.len(), 1000);
    }

    #[test]
    fn test_hash64bits_deterministic() {
        assert_eq!(hash64bits(b"abc"), hash64bits(b"abc"));
        assert_ne!(hash64bits(b"abc"), hash64bits(b"abd"));
        assert_ne!(hash64bits(&[]), 0);
        // BLAKE3("") = af1349b9f5f9a1a6...
        assert_eq!(hash64bits(&[]), 0xa6a1_f9f5_b949_13af);
    }

    #[test]
    fn test_random_tags_do_not_collide() {
        let tags: HashSet<Tag> = (0..10_000).map(|_| Tag::random()).collect();
        assert_eq!(tags.len(), 10_000);
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(Tag(255).to_string(), "0x00000000000000ff");
    }
}
