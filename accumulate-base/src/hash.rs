use core::fmt;
use core::str::FromStr;

use sha2::{Digest, Sha256};

use crate::encoding::{AccDecode, AccEncode, AccRead, AccWrite, DecodeError};

/// A 256-bit hash. Used as a transaction id and as a chain id.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Hash256(pub(crate) [u8; 32]);

/// Chain ids are SHA-256 digests of URL components.
pub type ChainId = Hash256;

impl Hash256 {
    pub const LENGTH: usize = 32;
    pub const ZERO: Self = Self([0u8; 32]);

    #[inline]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn from_slice(slice: &[u8]) -> Result<Self, DecodeError> {
        if slice.len() != Self::LENGTH {
            return Err(DecodeError::LengthOutOfRange {
                len: slice.len() as u64,
                max: Self::LENGTH as u64,
            });
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(slice);
        Ok(Self(buf))
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8; 32] {
        &self.0
    }

    #[inline]
    pub fn to_array(self) -> [u8; 32] {
        self.0
    }

    #[inline]
    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl AsRef<[u8]> for Hash256 {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    #[inline]
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| DecodeError::InvalidValue("Hash256 hex"))?;
        Self::from_slice(&bytes)
    }
}

impl AccEncode for Hash256 {
    #[inline]
    fn acc_encode<W: AccWrite>(&self, writer: &mut W) {
        writer.write_bytes(&self.0);
    }
}

impl AccDecode for Hash256 {
    #[inline]
    fn acc_decode<R: AccRead>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; 32];
        reader.read_into(&mut buf)?;
        Ok(Self(buf))
    }
}

/// SHA-256 digest of `data`.
#[inline]
pub fn sha256<T: AsRef<[u8]>>(data: T) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// SHA-256 digest of `data`, as a typed hash.
#[inline]
pub fn sha256_typed<T: AsRef<[u8]>>(data: T) -> Hash256 {
    Hash256::new(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_round_trip() {
        let h = sha256_typed(b"accumulate");
        let parsed: Hash256 = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Hash256::from_slice(&[0u8; 31]).is_err());
        assert!(Hash256::from_slice(&[0u8; 33]).is_err());
        assert!(Hash256::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert!(!sha256_typed(b"x").is_zero());
    }
}
