//! Content digests using BLAKE3.
//!
//! Every file recorded in the path index carries the digest of its content so
//! reconstruction can detect a desynchronized node graph.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Digest length in bytes.
pub const HASH_SIZE: usize = blake3::OUT_LEN;

/// Bytes shown by [`Hash::short`].
const SHORT_LEN: usize = 6;

/// BLAKE3 digest of one file's content.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    /// Digest of `content`.
    pub fn hash_bytes(content: &[u8]) -> Self {
        Hash(blake3::hash(content).into())
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(text: &str) -> Result<Self> {
        let mut bytes = [0u8; HASH_SIZE];
        hex::decode_to_slice(text, &mut bytes).map_err(|e| {
            Error::invalid_hash(format!("{:?} is not a {}-byte digest: {}", text, HASH_SIZE, e))
        })?;
        Ok(Hash(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Leading bytes in hex, enough to tell files apart in a listing.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..SHORT_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Hash::from_hex(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short())
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let hash = Hash::hash_bytes(b"hello world");
        assert_eq!(
            hash.to_string(),
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
        assert_eq!(hash.short(), "d74981efa70a");
        assert_eq!(format!("{:?}", hash), "Hash(d74981efa70a)");
    }

    #[test]
    fn test_empty_content_has_a_digest() {
        let empty = Hash::hash_bytes(b"");
        assert_ne!(empty, Hash::from_bytes([0; HASH_SIZE]));
        assert_eq!(empty.as_bytes().len(), HASH_SIZE);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let cases = vec![String::new(), "abcd".to_string(), "z".repeat(64), "a".repeat(66)];
        for text in &cases {
            assert!(text.parse::<Hash>().is_err(), "{:?} parsed", text);
        }
    }

    #[test]
    fn test_serializes_as_hex() {
        let hash = Hash::hash_bytes(b"abc");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            max_shrink_iters: 10000,
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_hex_parses_back(bytes in prop::array::uniform32(any::<u8>())) {
            let hash = Hash::from_bytes(bytes);
            prop_assert_eq!(hash.to_hex().parse::<Hash>()?, hash);
        }

        #[test]
        fn prop_digest_tracks_content(a: Vec<u8>, b: Vec<u8>) {
            prop_assert_eq!(Hash::hash_bytes(&a) == Hash::hash_bytes(&b), a == b);
        }
    }
}
