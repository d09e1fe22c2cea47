//! Transactions in the Blackcoin-family format.
//!
//! Unlike Bitcoin, every transaction carries an `nTime`-style timestamp
//! right after the version; the proof-of-stake kernel is tested against it.
//! Witness data uses the segwit marker/flag pattern and is excluded from
//! the txid.

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::{CoreError, Result};
use crate::hashes::{sha256d, Hash256};
use crate::script::Script;
use crate::serialize::{Decoder, Encoder, WireCodec};

/// Weight units per base-size byte.
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Lock times below this are block heights, above are unix times.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Sequence value that disables lock-time for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Signature hash type covering the whole transaction.
pub const SIGHASH_ALL: u32 = 1;

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The coinbase marker: zero txid, max index.
    pub fn null() -> Self {
        OutPoint { txid: Hash256::ZERO, vout: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack; empty for legacy spends.
    pub witness: Vec<Vec<u8>>,
}

impl TxInput {
    pub fn new(prevout: OutPoint) -> Self {
        TxInput {
            prevout,
            script_sig: Script::new(),
            sequence: SEQUENCE_FINAL,
            witness: Vec::new(),
        }
    }
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: Amount,
    pub script_pubkey: Script,
}

impl TxOutput {
    pub fn new(value: Amount, script_pubkey: Script) -> Self {
        TxOutput { value, script_pubkey }
    }

    /// The coinstake marker output and the coinbase of a PoS block are
    /// "empty": zero value, empty script.
    pub fn empty() -> Self {
        TxOutput { value: 0, script_pubkey: Script::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }

    pub fn set_empty(&mut self) {
        self.value = 0;
        self.script_pubkey = Script::new();
    }
}

/// A timestamped transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub vin: Vec<TxInput>,
    pub vout: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new() -> Self {
        Transaction { version: 1, time: 0, vin: Vec::new(), vout: Vec::new(), lock_time: 0 }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Coinstake shape: spends real inputs, at least two outputs, and the
    /// first output is the empty marker.
    pub fn is_coinstake(&self) -> bool {
        !self.is_coinbase()
            && !self.vin.is_empty()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|input| !input.witness.is_empty())
    }

    pub fn value_out(&self) -> Amount {
        self.vout.iter().map(|out| out.value).sum()
    }

    /// Transaction id: hash of the serialization without witness data.
    pub fn txid(&self) -> Hash256 {
        let mut enc = Encoder::new();
        self.encode_with(&mut enc, false);
        sha256d(&enc.into_bytes())
    }

    /// Witness transaction id; equals `txid` for legacy transactions.
    pub fn wtxid(&self) -> Hash256 {
        if !self.has_witness() {
            return self.txid();
        }
        let mut enc = Encoder::new();
        self.encode_with(&mut enc, true);
        sha256d(&enc.into_bytes())
    }

    /// Serialized size without witness data.
    pub fn base_size(&self) -> usize {
        let mut enc = Encoder::new();
        self.encode_with(&mut enc, false);
        enc.len()
    }

    /// Serialized size including witness data.
    pub fn total_size(&self) -> usize {
        let mut enc = Encoder::new();
        self.encode_with(&mut enc, true);
        enc.len()
    }

    /// BIP141 weight.
    pub fn weight(&self) -> usize {
        self.base_size() * (WITNESS_SCALE_FACTOR - 1) + self.total_size()
    }

    /// Legacy signature hash for input `input_index` against `script_code`.
    ///
    /// Every other input's scriptSig is blanked, the signed input carries the
    /// spent output's script, and the 4-byte hash type is appended before the
    /// double hash. Only `SIGHASH_ALL` is produced or accepted here.
    pub fn signature_hash(
        &self,
        input_index: usize,
        script_code: &Script,
        sighash_type: u32,
    ) -> Result<Hash256> {
        if input_index >= self.vin.len() {
            return Err(CoreError::Script(format!("signature input {input_index} out of range")));
        }
        if sighash_type != SIGHASH_ALL {
            return Err(CoreError::Script(format!("unsupported sighash type {sighash_type}")));
        }
        let mut tmp = self.clone();
        for (i, input) in tmp.vin.iter_mut().enumerate() {
            input.witness.clear();
            input.script_sig =
                if i == input_index { script_code.clone() } else { Script::new() };
        }
        let mut enc = Encoder::new();
        tmp.encode_with(&mut enc, false);
        enc.put_u32(sighash_type);
        Ok(sha256d(&enc.into_bytes()))
    }

    /// Finality against the next block's height and lock-time cutoff.
    pub fn is_final(&self, block_height: i32, block_time_cutoff: i64) -> bool {
        if self.lock_time == 0 {
            return true;
        }
        let threshold = if self.lock_time < LOCKTIME_THRESHOLD {
            block_height as i64
        } else {
            block_time_cutoff
        };
        if (self.lock_time as i64) < threshold {
            return true;
        }
        self.vin.iter().all(|input| input.sequence == SEQUENCE_FINAL)
    }

    fn encode_with(&self, enc: &mut Encoder, allow_witness: bool) {
        let with_witness = allow_witness && self.has_witness();
        enc.put_i32(self.version);
        enc.put_u32(self.time);
        if with_witness {
            // segwit marker + flag
            enc.put_u8(0x00);
            enc.put_u8(0x01);
        }
        enc.put_compact_size(self.vin.len() as u64);
        for input in &self.vin {
            enc.put_bytes(input.prevout.txid.as_bytes());
            enc.put_u32(input.prevout.vout);
            enc.put_var_bytes(input.script_sig.as_bytes());
            enc.put_u32(input.sequence);
        }
        enc.put_compact_size(self.vout.len() as u64);
        for output in &self.vout {
            enc.put_i64(output.value);
            enc.put_var_bytes(output.script_pubkey.as_bytes());
        }
        if with_witness {
            for input in &self.vin {
                enc.put_compact_size(input.witness.len() as u64);
                for item in &input.witness {
                    enc.put_var_bytes(item);
                }
            }
        }
        enc.put_u32(self.lock_time);
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl WireCodec for Transaction {
    fn encode(&self, enc: &mut Encoder) {
        self.encode_with(enc, true);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let version = dec.get_i32()?;
        let time = dec.get_u32()?;

        let mut vin_count = dec.get_compact_size()?;
        let mut has_witness = false;
        if vin_count == 0 {
            // marker byte: a flag of 0x01 follows, then the real input count
            let flag = dec.get_u8()?;
            if flag != 0x01 {
                return Err(CoreError::Decode(format!("bad segwit flag {flag:#04x}")));
            }
            has_witness = true;
            vin_count = dec.get_compact_size()?;
        }
        if vin_count == 0 {
            return Err(CoreError::Decode("transaction with no inputs".into()));
        }

        let mut vin = Vec::with_capacity(vin_count.min(1024) as usize);
        for _ in 0..vin_count {
            let txid = Hash256::from_bytes(dec.get_array::<32>()?);
            let vout = dec.get_u32()?;
            let script_sig = Script::from_bytes(dec.get_var_bytes()?);
            let sequence = dec.get_u32()?;
            vin.push(TxInput {
                prevout: OutPoint::new(txid, vout),
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let vout_count = dec.get_compact_size()?;
        let mut vout = Vec::with_capacity(vout_count.min(1024) as usize);
        for _ in 0..vout_count {
            let value = dec.get_i64()?;
            let script_pubkey = Script::from_bytes(dec.get_var_bytes()?);
            vout.push(TxOutput { value, script_pubkey });
        }

        if has_witness {
            let mut any = false;
            for input in vin.iter_mut() {
                let items = dec.get_compact_size()?;
                let mut witness = Vec::with_capacity(items.min(64) as usize);
                for _ in 0..items {
                    witness.push(dec.get_var_bytes()?);
                }
                any |= !witness.is_empty();
                input.witness = witness;
            }
            if !any {
                return Err(CoreError::NonCanonical("segwit marker without witness data".into()));
            }
        }

        let lock_time = dec.get_u32()?;
        Ok(Transaction { version, time, vin, vout, lock_time })
    }
}
