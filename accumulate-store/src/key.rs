//! Hashed storage keys.
//!
//! Backends only ever see 32-byte keys: the SHA-256 of a length-prefixed
//! encoding of a bucket name and its parts. Buckets namespace the store
//! without the backend knowing anything about them.

use core::fmt;

use accumulate_base::encoding::AccWrite;
use accumulate_base::{sha256, Hash256};

/// An opaque 32-byte storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct KeyHash(pub [u8; 32]);

impl KeyHash {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{byte:02x}")?;
        }
        f.write_str("…")
    }
}

/// Anything usable as a key part.
pub trait KeyPart {
    fn write_part(&self, buf: &mut Vec<u8>);
}

impl KeyPart for &str {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(self.as_bytes());
    }
}

impl KeyPart for String {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(self.as_bytes());
    }
}

impl KeyPart for &[u8] {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(self);
    }
}

impl KeyPart for Vec<u8> {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(self);
    }
}

impl KeyPart for Hash256 {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(self.as_slice());
    }
}

impl KeyPart for u64 {
    fn write_part(&self, buf: &mut Vec<u8>) {
        buf.write_var_bytes(&self.to_be_bytes());
    }
}

/// Derives the storage key for a bucket and its parts.
pub fn compute_key(bucket: &str, parts: &[&dyn KeyPart]) -> KeyHash {
    let mut buf = Vec::new();
    buf.write_var_bytes(bucket.as_bytes());
    for part in parts {
        part.write_part(&mut buf);
    }
    KeyHash(sha256(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let chain = Hash256::new(sha256(b"chain"));
        let a = compute_key("StateEntry", &[&chain]);
        let b = compute_key("StateEntry", &[&chain]);
        assert_eq!(a, b);
    }

    #[test]
    fn bucket_separates_keys() {
        let chain = Hash256::new(sha256(b"chain"));
        let a = compute_key("StateEntry", &[&chain]);
        let b = compute_key("Transaction", &[&chain]);
        assert_ne!(a, b);
    }

    #[test]
    fn parts_are_length_prefixed_not_concatenated() {
        // ("ab", "c") must not collide with ("a", "bc").
        let a = compute_key("b", &[&"ab", &"c"]);
        let b = compute_key("b", &[&"a", &"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn numeric_parts_distinguish_values() {
        let a = compute_key("MainChain", &[&1u64]);
        let b = compute_key("MainChain", &[&2u64]);
        assert_ne!(a, b);
    }
}
