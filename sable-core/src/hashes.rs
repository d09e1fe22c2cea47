//! 256-bit hashes and the digest helpers used throughout consensus.

use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, Result};

/// A 256-bit hash, stored in internal (little-endian) byte order.
///
/// Displayed in the conventional reversed hex order, so
/// `Hash256::from_hex("000001fa...")` parses the string you would see in a
/// block explorer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }

    /// Parse from display-order (big-endian) hex.
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.trim_start_matches("0x");
        let raw = hex::decode(s).map_err(|e| CoreError::Decode(format!("bad hash hex: {e}")))?;
        if raw.len() != 32 {
            return Err(CoreError::Decode(format!("hash hex has {} bytes, want 32", raw.len())));
        }
        let mut bytes = [0u8; 32];
        for (i, b) in raw.iter().rev().enumerate() {
            bytes[i] = *b;
        }
        Ok(Hash256(bytes))
    }

    /// Display-order hex string.
    pub fn to_hex(&self) -> String {
        let mut rev = self.0;
        rev.reverse();
        hex::encode(rev)
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Hash256(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Double SHA-256 of `data`.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&second);
    Hash256(bytes)
}

/// Double SHA-256 over the concatenation of two 32-byte halves.
///
/// Used by the merkle tree so the halves never need to be copied into an
/// intermediate buffer by callers.
pub fn sha256d_pair(left: &[u8; 32], right: &[u8; 32]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let first = hasher.finalize();
    let second = Sha256::digest(first);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&second);
    Hash256(bytes)
}

/// The scrypt(1024,1,1) digest used as the block identity hash, with the
/// input doubling as its own salt. Transactions and merkle nodes stay on
/// SHA256d; only block headers hash this way.
pub fn scrypt_hash(data: &[u8]) -> Hash256 {
    let params = scrypt::Params::new(10, 1, 1, 32).expect("fixed scrypt parameters are valid");
    let mut out = [0u8; 32];
    scrypt::scrypt(data, data, &params, &mut out)
        .expect("output length is fixed at 32 bytes");
    Hash256(out)
}

/// RIPEMD160(SHA256(data)), the script-level key and script id digest.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let rip = Ripemd160::digest(sha);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&rip);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_is_display_order() {
        let h = Hash256::from_hex("000001faef25dec4fbcf906e6242621df2c183bf232f263d0ba5b101911e4563")
            .unwrap();
        assert_eq!(
            h.to_hex(),
            "000001faef25dec4fbcf906e6242621df2c183bf232f263d0ba5b101911e4563"
        );
        // internal order is reversed: the leading display zeros are the last bytes
        assert_eq!(h.0[31], 0x00);
        assert_eq!(h.0[0], 0x63);
    }

    #[test]
    fn sha256d_empty() {
        // double SHA-256 of the empty string, display order
        assert_eq!(
            sha256d(b"").to_hex(),
            "56944c5d3f98413ef45cf54545538103cc9f298e0575820ad3591376e2e0f65d"
        );
    }

    #[test]
    fn scrypt_hash_is_deterministic_and_distinct() {
        let a = scrypt_hash(b"header bytes");
        assert_eq!(a, scrypt_hash(b"header bytes"));
        assert_ne!(a, scrypt_hash(b"header bytez"));
        assert_ne!(a, sha256d(b"header bytes"));
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(Hash256::from_hex("abcd").is_err());
        assert!(Hash256::from_hex("zz").is_err());
    }
}
