//! Script primitives.
//!
//! Only the small surface consensus and staking need: building the handful
//! of standard output scripts, pushing data and numbers the canonical way,
//! and classifying outputs so the stake searcher can decide how to pay out
//! a kernel.

use serde::{Deserialize, Serialize};

// Opcodes used by the standard templates.
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;

/// A serialized script.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Script(pub Vec<u8>);

/// Standard output script classes recognized by the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxoutType {
    /// `<pubkey> OP_CHECKSIG`
    Pubkey(Vec<u8>),
    /// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
    PubkeyHash([u8; 20]),
    /// `OP_HASH160 <20> OP_EQUAL`
    ScriptHash([u8; 20]),
    /// `OP_0 <20>`
    WitnessV0KeyHash([u8; 20]),
    /// `OP_1 <32>`
    WitnessV1Taproot([u8; 32]),
    /// `OP_RETURN ...`
    NullData,
    NonStandard,
}

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push_opcode(&mut self, opcode: u8) -> &mut Self {
        self.0.push(opcode);
        self
    }

    /// Push raw data with the minimal push prefix.
    pub fn push_data(&mut self, data: &[u8]) -> &mut Self {
        match data.len() {
            0 => self.0.push(OP_0),
            1..=0x4b => {
                self.0.push(data.len() as u8);
                self.0.extend_from_slice(data);
            }
            0x4c..=0xff => {
                self.0.push(OP_PUSHDATA1);
                self.0.push(data.len() as u8);
                self.0.extend_from_slice(data);
            }
            0x100..=0xffff => {
                self.0.push(OP_PUSHDATA2);
                self.0.extend_from_slice(&(data.len() as u16).to_le_bytes());
                self.0.extend_from_slice(data);
            }
            _ => {
                self.0.push(OP_PUSHDATA4);
                self.0.extend_from_slice(&(data.len() as u32).to_le_bytes());
                self.0.extend_from_slice(data);
            }
        }
        self
    }

    /// Push an integer the way script numbers are pushed: OP_0/OP_1..OP_16
    /// for the small range, minimally-encoded little-endian bytes otherwise.
    /// Block heights in the coinbase use this form.
    pub fn push_int(&mut self, value: i64) -> &mut Self {
        if value == 0 {
            self.0.push(OP_0);
        } else if value == -1 {
            self.0.push(OP_1NEGATE);
        } else if (1..=16).contains(&value) {
            self.0.push(OP_1 + (value as u8) - 1);
        } else {
            let bytes = scriptnum_encode(value);
            self.push_data(&bytes);
        }
        self
    }

    /// `<pubkey> OP_CHECKSIG`
    pub fn new_p2pk(pubkey: &[u8]) -> Self {
        let mut script = Script::new();
        script.push_data(pubkey).push_opcode(OP_CHECKSIG);
        script
    }

    /// `OP_DUP OP_HASH160 <key hash> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn new_p2pkh(key_hash: &[u8; 20]) -> Self {
        let mut script = Script::new();
        script
            .push_opcode(OP_DUP)
            .push_opcode(OP_HASH160)
            .push_data(key_hash)
            .push_opcode(OP_EQUALVERIFY)
            .push_opcode(OP_CHECKSIG);
        script
    }

    /// `OP_HASH160 <script hash> OP_EQUAL`
    pub fn new_p2sh(script_hash: &[u8; 20]) -> Self {
        let mut script = Script::new();
        script
            .push_opcode(OP_HASH160)
            .push_data(script_hash)
            .push_opcode(OP_EQUAL);
        script
    }

    /// `OP_0 <key hash>`
    pub fn new_p2wpkh(key_hash: &[u8; 20]) -> Self {
        let mut script = Script::new();
        script.push_opcode(OP_0).push_data(key_hash);
        script
    }

    /// Count legacy signature operations, walking pushes so data bytes are
    /// never miscounted as opcodes. CHECKMULTISIG costs the historical 20.
    pub fn count_sigops(&self) -> usize {
        const OP_CHECKSIGVERIFY: u8 = 0xad;
        const OP_CHECKMULTISIG: u8 = 0xae;
        const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

        let bytes = &self.0;
        let mut count = 0;
        let mut i = 0;
        while i < bytes.len() {
            let opcode = bytes[i];
            i += 1;
            match opcode {
                1..=0x4b => i += opcode as usize,
                OP_PUSHDATA1 => {
                    if i >= bytes.len() {
                        break;
                    }
                    i += 1 + bytes[i] as usize;
                }
                OP_PUSHDATA2 => {
                    if i + 1 >= bytes.len() {
                        break;
                    }
                    i += 2 + u16::from_le_bytes([bytes[i], bytes[i + 1]]) as usize;
                }
                OP_PUSHDATA4 => {
                    if i + 3 >= bytes.len() {
                        break;
                    }
                    let len =
                        u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
                    i += 4 + len as usize;
                }
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => count += 20,
                _ => {}
            }
        }
        count
    }

    /// Classify against the standard templates.
    pub fn solve(&self) -> TxoutType {
        let b = &self.0;
        match b.len() {
            35 if b[0] == 33 && b[34] == OP_CHECKSIG => TxoutType::Pubkey(b[1..34].to_vec()),
            67 if b[0] == 65 && b[66] == OP_CHECKSIG => TxoutType::Pubkey(b[1..66].to_vec()),
            25 if b[0] == OP_DUP
                && b[1] == OP_HASH160
                && b[2] == 20
                && b[23] == OP_EQUALVERIFY
                && b[24] == OP_CHECKSIG =>
            {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&b[3..23]);
                TxoutType::PubkeyHash(hash)
            }
            23 if b[0] == OP_HASH160 && b[1] == 20 && b[22] == OP_EQUAL => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&b[2..22]);
                TxoutType::ScriptHash(hash)
            }
            22 if b[0] == OP_0 && b[1] == 20 => {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&b[2..22]);
                TxoutType::WitnessV0KeyHash(hash)
            }
            34 if b[0] == OP_1 && b[1] == 32 => {
                let mut key = [0u8; 32];
                key.copy_from_slice(&b[2..34]);
                TxoutType::WitnessV1Taproot(key)
            }
            _ if !b.is_empty() && b[0] == OP_RETURN => TxoutType::NullData,
            _ => TxoutType::NonStandard,
        }
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Script({})", hex::encode(&self.0))
    }
}

/// Minimal little-endian script-number encoding (CScriptNum serialization).
fn scriptnum_encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let mut out = Vec::new();
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // If the top bit of the last byte is set, an extra byte carries the sign.
    if out.last().copied().unwrap_or(0) & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        let last = out.last_mut().unwrap();
        *last |= 0x80;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::hash160;

    #[test]
    fn p2pkh_solves() {
        let hash = [7u8; 20];
        let script = Script::new_p2pkh(&hash);
        assert_eq!(script.len(), 25);
        assert_eq!(script.solve(), TxoutType::PubkeyHash(hash));
    }

    #[test]
    fn p2pk_solves_compressed_and_uncompressed() {
        let compressed = vec![0x02; 33];
        assert_eq!(Script::new_p2pk(&compressed).solve(), TxoutType::Pubkey(compressed.clone()));
        let uncompressed = vec![0x04; 65];
        assert_eq!(Script::new_p2pk(&uncompressed).solve(), TxoutType::Pubkey(uncompressed));
    }

    #[test]
    fn witness_programs_solve() {
        let mut script = Script::new();
        script.push_opcode(OP_0).push_data(&[9u8; 20]);
        assert_eq!(script.solve(), TxoutType::WitnessV0KeyHash([9u8; 20]));

        let mut taproot = Script::new();
        taproot.push_opcode(OP_1).push_data(&[3u8; 32]);
        assert_eq!(taproot.solve(), TxoutType::WitnessV1Taproot([3u8; 32]));
    }

    #[test]
    fn empty_and_garbage_are_nonstandard() {
        assert_eq!(Script::new().solve(), TxoutType::NonStandard);
        assert_eq!(Script::from_bytes(vec![0xff, 0x01]).solve(), TxoutType::NonStandard);
    }

    #[test]
    fn push_int_small_values_use_opcodes() {
        let mut script = Script::new();
        script.push_int(0);
        assert_eq!(script.as_bytes(), &[OP_0]);

        let mut script = Script::new();
        script.push_int(16);
        assert_eq!(script.as_bytes(), &[OP_16]);

        // 42 needs a data push of the scriptnum bytes
        let mut script = Script::new();
        script.push_int(42);
        assert_eq!(script.as_bytes(), &[0x01, 0x2a]);

        // 128 would set the sign bit, so it gets a trailing zero byte
        let mut script = Script::new();
        script.push_int(128);
        assert_eq!(script.as_bytes(), &[0x02, 0x80, 0x00]);
    }

    #[test]
    fn sigop_counting_skips_push_data() {
        assert_eq!(Script::new_p2pk(&[0x02; 33]).count_sigops(), 1);
        assert_eq!(Script::new_p2pkh(&[7; 20]).count_sigops(), 1);
        // an OP_CHECKSIG byte inside pushed data does not count
        let mut script = Script::new();
        script.push_data(&[OP_CHECKSIG; 40]);
        assert_eq!(script.count_sigops(), 0);
        // bare multisig costs the historical 20
        let mut multisig = Script::new();
        multisig.push_opcode(OP_1).push_opcode(0xae);
        assert_eq!(multisig.count_sigops(), 20);
    }

    #[test]
    fn p2sh_from_hash160() {
        let inner = Script::new_p2pk(&[0x02; 33]);
        let script_hash = hash160(inner.as_bytes());
        let p2sh = Script::new_p2sh(&script_hash);
        assert_eq!(p2sh.solve(), TxoutType::ScriptHash(script_hash));
    }
}
