//! 256-bit target arithmetic and the compact ("bits") encoding.
//!
//! The compact form packs a 256-bit target into 32 bits as
//! `mantissa * 256^(exponent - 3)` with a 23-bit mantissa, matching the
//! format used in block headers since Bitcoin. Decoding reports the
//! negative and overflow conditions separately so proof-of-work checks can
//! reject malformed header bits.

use primitive_types::U256;

use crate::hashes::Hash256;

/// Decode a compact target. Returns `(target, negative, overflow)`.
pub fn compact_to_target(bits: u32) -> (U256, bool, bool) {
    let size = (bits >> 24) as usize;
    let word = bits & 0x007f_ffff;

    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3))
    };

    let negative = word != 0 && (bits & 0x0080_0000) != 0;
    let overflow = word != 0
        && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));

    (target, negative, overflow)
}

/// Encode a target in compact form. The sign bit is never set.
pub fn target_to_compact(target: U256) -> u32 {
    let mut size = (target.bits() + 7) / 8;
    let mut compact: u64 = if size <= 3 {
        target.low_u64() << (8 * (3 - size))
    } else {
        (target >> (8 * (size - 3))).low_u64()
    };

    // The mantissa sign bit must stay clear; borrow an exponent byte if set.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }

    (compact as u32 & 0x007f_ffff) | ((size as u32) << 24)
}

/// Interpret a hash as a 256-bit unsigned integer (the `UintToArith256`
/// direction: internal little-endian bytes).
pub fn u256_from_hash(hash: &Hash256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Parse a display-order (big-endian) hex constant such as a pow/pos limit.
pub fn u256_from_be_hex(s: &str) -> U256 {
    U256::from_big_endian(&hex::decode(s).expect("valid hex constant"))
}
