//! Wire encoding primitives.
//!
//! Consensus structures serialize through an explicit [`Encoder`] /
//! [`Decoder`] pair. Each structure implements both directions against the
//! same field list, so the schema lives in one place per type; conditional
//! fields (such as the proof-of-stake marker on block headers) are part of
//! that schema, not of the caller.
//!
//! Integers are little-endian. Collection lengths use the CompactSize
//! format: values below 0xfd are a single byte, then 0xfd+u16, 0xfe+u32,
//! 0xff+u64, and non-minimal encodings are rejected.

use crate::error::{CoreError, Result};

/// Growable output buffer for wire encoding.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Encoder { buf: Vec::with_capacity(capacity) }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_compact_size(&mut self, value: u64) {
        if value < 0xfd {
            self.put_u8(value as u8);
        } else if value <= 0xffff {
            self.put_u8(0xfd);
            self.put_u16(value as u16);
        } else if value <= 0xffff_ffff {
            self.put_u8(0xfe);
            self.put_u32(value as u32);
        } else {
            self.put_u8(0xff);
            self.put_u64(value);
        }
    }

    /// Length-prefixed byte string.
    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_compact_size(bytes.len() as u64);
        self.put_bytes(bytes);
    }
}

/// Cursor over a byte slice for wire decoding.
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Decoder { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(CoreError::Decode(format!(
                "unexpected end of data: want {n} bytes, have {}",
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub fn get_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_compact_size(&mut self) -> Result<u64> {
        let first = self.get_u8()?;
        let value = match first {
            0xfd => {
                let v = self.get_u16()? as u64;
                if v < 0xfd {
                    return Err(CoreError::NonCanonical(format!("compact size {v} in 0xfd form")));
                }
                v
            }
            0xfe => {
                let v = self.get_u32()? as u64;
                if v <= 0xffff {
                    return Err(CoreError::NonCanonical(format!("compact size {v} in 0xfe form")));
                }
                v
            }
            0xff => {
                let v = self.get_u64()?;
                if v <= 0xffff_ffff {
                    return Err(CoreError::NonCanonical(format!("compact size {v} in 0xff form")));
                }
                v
            }
            b => b as u64,
        };
        Ok(value)
    }

    /// Length-prefixed byte string, bounded to what the buffer can hold.
    pub fn get_var_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(CoreError::Decode(format!(
                "var bytes length {len} exceeds remaining {}",
                self.remaining()
            )));
        }
        self.get_bytes(len as usize)
    }

    /// Fails unless the whole input was consumed.
    pub fn finish(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Decode(format!("{} trailing bytes", self.remaining())))
        }
    }
}

/// Two disjoint operations over one field schema.
pub trait WireCodec: Sized {
    fn encode(&self, enc: &mut Encoder);
    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;

    fn to_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode(&mut enc);
        enc.into_bytes()
    }

    fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(data);
        let value = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_size_boundaries() {
        for value in [0u64, 1, 252, 253, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000] {
            let mut enc = Encoder::new();
            enc.put_compact_size(value);
            let bytes = enc.into_bytes();
            let mut dec = Decoder::new(&bytes);
            assert_eq!(dec.get_compact_size().unwrap(), value);
            assert!(dec.is_empty());
        }
    }

    #[test]
    fn compact_size_rejects_non_minimal() {
        // 252 must be a single byte, not the 0xfd form
        assert!(Decoder::new(&[0xfd, 252, 0]).get_compact_size().is_err());
        assert!(Decoder::new(&[0xfe, 0xff, 0xff, 0, 0]).get_compact_size().is_err());
        assert!(Decoder::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0])
            .get_compact_size()
            .is_err());
    }

    #[test]
    fn var_bytes_length_is_bounded() {
        // claims 200 bytes but provides 2
        assert!(Decoder::new(&[200, 1, 2]).get_var_bytes().is_err());
    }

    #[test]
    fn truncated_int_reads_fail() {
        assert!(Decoder::new(&[1, 2]).get_u32().is_err());
        assert!(Decoder::new(&[]).get_u8().is_err());
    }

    #[test]
    fn little_endian_ints() {
        let mut enc = Encoder::new();
        enc.put_u32(0x0102_0304);
        assert_eq!(enc.into_bytes(), vec![0x04, 0x03, 0x02, 0x01]);
    }
}
